use quiz_core::model::{QuestionDraft, Role};
use quiz_core::time::fixed_clock;
use services::{
    AnonymousSession, AppServices, Identity, PresentedQuestion, QuizStep, SubmitRequest, Terminal,
};

async fn app_with_bank(db: &str) -> AppServices {
    let url = format!("sqlite:file:{db}?mode=memory&cache=shared");
    let app = AppServices::new_sqlite(&url, fixed_clock(), "root", false)
        .await
        .expect("services");
    let store = app.store();
    for n in 1..=12 {
        store
            .upsert(QuestionDraft {
                number: n,
                title: format!("Question {n}"),
                options: vec!["north".into(), "south".into(), "east".into(), "west".into()],
                answer: "east".into(),
            })
            .await
            .unwrap();
    }
    app
}

/// Stored index of an option other than the answer.
fn wrong_choice(view: &PresentedQuestion) -> usize {
    let shown = (view.answer_index + 1) % view.options.len();
    view.stored_index(shown).unwrap()
}

fn right_choice(view: &PresentedQuestion) -> usize {
    view.stored_index(view.answer_index).unwrap()
}

async fn question_at(app: &AppServices, identity: &Identity, number: Option<u32>) -> PresentedQuestion {
    match app.quiz().current_question(identity, number).await.unwrap() {
        QuizStep::Question(q) => q,
        other => panic!("expected a question, got {other:?}"),
    }
}

#[tokio::test]
async fn alice_misses_then_clears_in_practice() {
    let app = app_with_bank("memdb_flow_alice").await;
    let quiz = app.quiz();
    let alice = app.identity().resolve("alice").await.unwrap();
    let me = Identity::Registered(alice.clone());

    quiz.reset_progress(&me, 5).await.unwrap();
    let q5 = question_at(&app, &me, None).await;
    assert_eq!(q5.number, 5);

    let outcome = quiz
        .submit(
            &me,
            SubmitRequest {
                question_id: q5.id,
                chosen_option_index: wrong_choice(&q5),
                current_number: Some(5),
                practice_mode: false,
            },
        )
        .await
        .unwrap();
    assert!(!outcome.correct);
    assert_eq!(outcome.canonical_answer, "east");
    assert_eq!(outcome.next_number, Some(6));
    assert_eq!(quiz.progress(&me).await.unwrap().current(), 6);
    assert_eq!(
        quiz.miss_entry(&me, q5.id).await.unwrap().unwrap().wrong_count,
        1
    );

    let practice = quiz.practice_start(&me, None).await.unwrap().unwrap();
    assert_eq!(practice.number, 5);
    let outcome = quiz
        .submit(
            &me,
            SubmitRequest {
                question_id: practice.id,
                chosen_option_index: right_choice(&practice),
                current_number: Some(5),
                practice_mode: true,
            },
        )
        .await
        .unwrap();
    assert!(outcome.correct);
    assert_eq!(outcome.terminal, Some(Terminal::PracticeComplete));
    assert!(quiz.miss_entry(&me, q5.id).await.unwrap().is_none());
    assert!(quiz.review(&me).await.unwrap().is_empty());
    assert_eq!(quiz.progress(&me).await.unwrap().current(), 6);
}

#[tokio::test]
async fn bob_inherits_anonymous_misses_on_login() {
    let app = app_with_bank("memdb_flow_bob").await;
    let quiz = app.quiz();
    let session = AnonymousSession::new();
    let anon = Identity::Anonymous(session.clone());

    let q9 = question_at(&app, &anon, Some(9)).await;
    for _ in 0..2 {
        quiz.submit(
            &anon,
            SubmitRequest {
                question_id: q9.id,
                chosen_option_index: wrong_choice(&q9),
                current_number: Some(9),
                practice_mode: false,
            },
        )
        .await
        .unwrap();
    }
    let transient = quiz.review(&anon).await.unwrap();
    assert_eq!(transient.len(), 1);
    assert_eq!(transient[0].wrong_count, 2);

    let bob = app.identity().login("bob", &session).await.unwrap();
    let me = Identity::Registered(bob);

    let durable = quiz.miss_entry(&me, q9.id).await.unwrap().unwrap();
    assert_eq!(durable.wrong_count, 2);
    assert_eq!(quiz.progress(&me).await.unwrap().current(), 10);
    assert!(quiz.review(&anon).await.unwrap().is_empty());
    assert!(session.current_number().is_none());
}

#[tokio::test]
async fn practice_wraps_to_the_lowest_missed_number() {
    let app = app_with_bank("memdb_flow_wrap").await;
    let quiz = app.quiz();
    let carol = app.identity().resolve("carol").await.unwrap();
    let me = Identity::Registered(carol);

    let mut ids = Vec::new();
    for n in [3, 7, 10] {
        let q = question_at(&app, &me, Some(n)).await;
        quiz.submit(
            &me,
            SubmitRequest {
                question_id: q.id,
                chosen_option_index: wrong_choice(&q),
                current_number: Some(n),
                practice_mode: false,
            },
        )
        .await
        .unwrap();
        ids.push(q);
    }

    let q10 = &ids[2];
    let outcome = quiz
        .submit(
            &me,
            SubmitRequest {
                question_id: q10.id,
                chosen_option_index: wrong_choice(q10),
                current_number: Some(10),
                practice_mode: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.next_number, Some(3));
    assert_eq!(
        quiz.miss_entry(&me, q10.id).await.unwrap().unwrap().wrong_count,
        2
    );
    assert_eq!(quiz.progress(&me).await.unwrap().current(), 11);
}

#[tokio::test]
async fn superadmin_is_seeded_and_listed() {
    let app = app_with_bank("memdb_flow_admin").await;
    let identity = app.identity();
    let root = identity.find("root").await.unwrap().unwrap();
    assert_eq!(root.role(), Role::Superadmin);

    let dave = identity.resolve("dave").await.unwrap();
    let promoted = identity.set_role(&root, dave.id(), Role::Admin).await.unwrap();
    assert_eq!(promoted.role(), Role::Admin);

    let handles: Vec<String> = identity
        .list_learners()
        .await
        .unwrap()
        .iter()
        .map(|l| l.handle().to_owned())
        .collect();
    assert_eq!(handles.len(), 2);
    assert!(handles.contains(&"root".to_string()));
}
