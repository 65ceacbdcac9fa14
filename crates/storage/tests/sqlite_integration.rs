use chrono::Duration;
use quiz_core::model::{QuestionDraft, QuestionId, Role, ValidatedQuestion};
use quiz_core::time::fixed_now;
use sqlx::Row;
use storage::repository::{
    LearnerRepository, ProgressRepository, QuestionRepository, StorageError, StoreMaintenance,
    WrongAnswerRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn validated(number: u32) -> ValidatedQuestion {
    QuestionDraft {
        number,
        title: format!("Question {number}"),
        options: vec![
            "plain".into(),
            "it's, \"tricky\"".into(),
            "[not a list]".into(),
        ],
        answer: "it's, \"tricky\"".into(),
    }
    .validate()
    .unwrap()
}

#[tokio::test]
async fn sqlite_question_upsert_roundtrips_options() {
    let repo = connect("memdb_questions").await;

    let id = repo.upsert_question(&validated(1)).await.unwrap();
    let again = repo.upsert_question(&validated(1)).await.unwrap();
    assert_eq!(id, again);

    let q = repo.question_by_id(id).await.unwrap().unwrap();
    assert_eq!(q.number(), 1);
    assert_eq!(q.options(), validated(1).options());
    assert_eq!(q.answer(), "it's, \"tricky\"");

    for n in 2..=25 {
        repo.upsert_question(&validated(n)).await.unwrap();
    }
    assert_eq!(repo.count_questions().await.unwrap(), 25);

    let page3 = repo.list_questions(3, 10).await.unwrap();
    let numbers: Vec<u32> = page3.iter().map(|q| q.number()).collect();
    assert_eq!(numbers, (21..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn sqlite_next_number_after_skips_gaps() {
    let repo = connect("memdb_gaps").await;
    assert_eq!(repo.next_number_after(0).await.unwrap(), None);
    for n in [1, 2, 4] {
        repo.upsert_question(&validated(n)).await.unwrap();
    }
    assert_eq!(repo.next_number_after(2).await.unwrap(), Some(4));
    assert_eq!(repo.next_number_after(0).await.unwrap(), Some(1));
    assert_eq!(repo.next_number_after(4).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_malformed_options_surface_as_not_found() {
    let repo = connect("memdb_malformed").await;
    let id = repo.upsert_question(&validated(7)).await.unwrap();

    sqlx::query("UPDATE questions SET options = ?1 WHERE id = ?2")
        .bind("['legacy', 'literal']")
        .bind(i64::try_from(id.value()).unwrap())
        .execute(repo.pool())
        .await
        .unwrap();

    assert!(repo.question_by_id(id).await.unwrap().is_none());
    assert!(repo.question_by_number(7).await.unwrap().is_none());
    assert!(repo.list_questions(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_ledger_counts_orders_and_cycles() {
    let repo = connect("memdb_ledger").await;
    let alice = repo
        .ensure_learner("alice", Role::Member, fixed_now())
        .await
        .unwrap();

    let mut ids = std::collections::HashMap::new();
    for n in [3, 7, 10] {
        ids.insert(n, repo.upsert_question(&validated(n)).await.unwrap());
    }

    let now = fixed_now();
    for k in 1..=3 {
        let count = repo.record_miss(alice.id(), ids[&3], now).await.unwrap();
        assert_eq!(count, k);
    }
    repo.record_miss(alice.id(), ids[&7], now + Duration::minutes(5))
        .await
        .unwrap();
    repo.record_miss(alice.id(), ids[&10], now + Duration::minutes(5))
        .await
        .unwrap();
    repo.record_miss(alice.id(), ids[&10], now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(repo.miss_count(alice.id()).await.unwrap(), 3);
    let entry = repo.miss_entry(alice.id(), ids[&3]).await.unwrap().unwrap();
    assert_eq!(entry.wrong_count, 3);

    let order: Vec<u32> = repo
        .misses(alice.id())
        .await
        .unwrap()
        .iter()
        .map(|m| m.number())
        .collect();
    assert_eq!(order, vec![10, 7, 3]);

    let next = |n| {
        let repo = repo.clone();
        let learner = alice.id();
        async move {
            repo.next_miss_after(learner, n)
                .await
                .unwrap()
                .map(|m| m.number())
        }
    };
    assert_eq!(next(7).await, Some(10));
    assert_eq!(next(10).await, Some(3));
    assert_eq!(next(3).await, Some(7));
    assert_eq!(
        repo.first_miss(alice.id()).await.unwrap().map(|m| m.number()),
        Some(3)
    );

    assert!(repo.remove_miss(alice.id(), ids[&3]).await.unwrap());
    assert!(repo.miss_entry(alice.id(), ids[&3]).await.unwrap().is_none());
    assert_eq!(repo.miss_count(alice.id()).await.unwrap(), 2);
}

#[tokio::test]
async fn sqlite_miss_for_unknown_question_is_not_found() {
    let repo = connect("memdb_ledger_fk").await;
    let bob = repo
        .ensure_learner("bob", Role::Member, fixed_now())
        .await
        .unwrap();
    let err = repo
        .record_miss(bob.id(), QuestionId::new(404), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_merge_misses_is_one_transaction() {
    let repo = connect("memdb_ledger_merge").await;
    let bob = repo
        .ensure_learner("bob", Role::Member, fixed_now())
        .await
        .unwrap();
    let q4 = repo.upsert_question(&validated(4)).await.unwrap();
    let q9 = repo.upsert_question(&validated(9)).await.unwrap();
    repo.record_miss(bob.id(), q9, fixed_now()).await.unwrap();

    let at = fixed_now() + Duration::minutes(1);
    let merged = repo
        .merge_misses(bob.id(), &[(q4, 2), (QuestionId::new(404), 5), (q9, 3)], at)
        .await
        .unwrap();
    assert_eq!(merged, vec![q4, q9]);
    assert_eq!(repo.miss_entry(bob.id(), q4).await.unwrap().unwrap().wrong_count, 2);
    let q9_entry = repo.miss_entry(bob.id(), q9).await.unwrap().unwrap();
    assert_eq!(q9_entry.wrong_count, 4);
    assert_eq!(q9_entry.last_review_time, at);

    let err = repo
        .merge_misses(quiz_core::model::LearnerId::new(999), &[(q4, 1)], at)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert_eq!(repo.miss_count(bob.id()).await.unwrap(), 2);
}

#[tokio::test]
async fn sqlite_learners_progress_and_roles() {
    let repo = connect("memdb_learners").await;
    let root = repo
        .ensure_learner("root", Role::Superadmin, fixed_now())
        .await
        .unwrap();
    let carol = repo
        .ensure_learner("carol", Role::Member, fixed_now() + Duration::seconds(1))
        .await
        .unwrap();
    let carol_again = repo
        .ensure_learner("carol", Role::Admin, fixed_now())
        .await
        .unwrap();
    assert_eq!(carol.id(), carol_again.id());
    assert_eq!(carol_again.role(), Role::Member);

    let listed: Vec<String> = repo
        .list_learners()
        .await
        .unwrap()
        .iter()
        .map(|l| l.handle().to_owned())
        .collect();
    assert_eq!(listed, vec!["carol", "root"]);

    repo.set_role(carol.id(), Role::Admin).await.unwrap();
    let carol = repo.learner_by_handle("carol").await.unwrap().unwrap();
    assert_eq!(carol.role(), Role::Admin);
    assert_eq!(root.role(), Role::Superadmin);

    assert!(repo.progress(carol.id()).await.unwrap().is_none());
    let start = repo.ensure_progress(carol.id()).await.unwrap();
    assert_eq!(start.current(), 1);

    repo.set_progress(carol.id(), quiz_core::model::Progress::at(14))
        .await
        .unwrap();
    assert_eq!(repo.ensure_progress(carol.id()).await.unwrap().current(), 14);
    assert_eq!(repo.progress(carol.id()).await.unwrap().unwrap().current(), 14);
}

#[tokio::test]
async fn sqlite_reset_all_clears_tables() {
    let repo = connect("memdb_reset").await;
    repo.upsert_question(&validated(1)).await.unwrap();
    repo.ensure_learner("dave", Role::Member, fixed_now())
        .await
        .unwrap();

    repo.reset_all().await.unwrap();

    let row = sqlx::query("SELECT COUNT(*) AS n FROM learners")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("n"), 0);
    assert_eq!(repo.count_questions().await.unwrap(), 0);
}
