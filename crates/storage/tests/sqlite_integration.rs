use orfo_core::model::{Question, ReminderTime, UserId};
use storage::repository::{
    CategoryRepository, LedgerRepository, PoolRepository, ScheduleRepository, StorageError,
    ToggleOutcome,
};
use storage::sqlite::SqliteRepository;

fn question(front: &str, back: &str) -> Question {
    Question::new(front, back).unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_category_round_trip_preserves_insertion_order() {
    let repo = connect("memdb_categories").await;
    let user = UserId::new("u1");

    repo.create_category(&user, "Unit 1").await.unwrap();
    repo.add_question(&user, "Unit 1", &question("cat", "felis"))
        .await
        .unwrap();
    repo.add_question(&user, "Unit 1", &question("dog", "canis"))
        .await
        .unwrap();

    let cat = repo.get_category(&user, "Unit 1").await.unwrap().unwrap();
    assert_eq!(cat.len(), 2);
    assert_eq!(cat.questions()[0].pair_key(), "cat←felis");
    assert_eq!(cat.questions()[1].pair_key(), "dog←canis");

    assert_eq!(repo.category_names(&user).await.unwrap(), vec!["Unit 1"]);
    assert_eq!(repo.question_count(&user, "Unit 1").await.unwrap(), 2);
}

#[tokio::test]
async fn sqlite_duplicate_category_is_a_conflict() {
    let repo = connect("memdb_conflict").await;
    let user = UserId::new("u1");

    repo.create_category(&user, "A").await.unwrap();
    let err = repo.create_category(&user, "A").await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // A different user may reuse the name.
    repo.create_category(&UserId::new("u2"), "A").await.unwrap();
}

#[tokio::test]
async fn sqlite_replace_and_remove_question() {
    let repo = connect("memdb_edit").await;
    let user = UserId::new("u1");

    repo.create_category(&user, "A").await.unwrap();
    repo.add_question(&user, "A", &question("cot", "cat"))
        .await
        .unwrap();

    repo.replace_question(&user, "A", "cot←cat", &question("kot", "cat"))
        .await
        .unwrap();
    let cat = repo.get_category(&user, "A").await.unwrap().unwrap();
    assert_eq!(cat.questions()[0].pair_key(), "kot←cat");

    let err = repo
        .replace_question(&user, "A", "cot←cat", &question("x", "y"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    repo.remove_question(&user, "A", "kot←cat").await.unwrap();
    assert_eq!(repo.question_count(&user, "A").await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_delete_category_cascades_to_questions() {
    let repo = connect("memdb_cascade").await;
    let user = UserId::new("u1");

    repo.create_category(&user, "A").await.unwrap();
    repo.add_question(&user, "A", &question("cat", "felis"))
        .await
        .unwrap();
    repo.delete_category(&user, "A").await.unwrap();

    assert!(repo.get_category(&user, "A").await.unwrap().is_none());
    assert_eq!(repo.question_count(&user, "A").await.unwrap(), 0);
    // Recreating starts empty.
    repo.create_category(&user, "A").await.unwrap();
    assert_eq!(repo.question_count(&user, "A").await.unwrap(), 0);
}

#[tokio::test]
async fn sqlite_ledger_increment_decrement_lifecycle() {
    let repo = connect("memdb_ledger").await;
    let user = UserId::new("u1");

    assert_eq!(repo.increment(&user, "A", "cat←felis").await.unwrap(), 1);
    assert_eq!(repo.increment(&user, "A", "cat←felis").await.unwrap(), 2);

    assert_eq!(
        repo.decrement_or_remove(&user, "A", "cat←felis")
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        repo.decrement_or_remove(&user, "A", "cat←felis")
            .await
            .unwrap(),
        0
    );

    assert!(repo.entries(&user, None).await.unwrap().is_empty());
    assert!(
        repo.categories_with_mistakes(&user)
            .await
            .unwrap()
            .is_empty()
    );

    // Decrementing an absent entry stays at zero without creating anything.
    assert_eq!(
        repo.decrement_or_remove(&user, "A", "cat←felis")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn sqlite_ledger_listing_and_rename() {
    let repo = connect("memdb_listing").await;
    let user = UserId::new("u1");

    for _ in 0..3 {
        repo.increment(&user, "A", "b←y").await.unwrap();
    }
    repo.increment(&user, "A", "a←x").await.unwrap();
    repo.increment(&user, "B", "c←z").await.unwrap();

    let all = repo.entries(&user, None).await.unwrap();
    let pairs: Vec<&str> = all.iter().map(|r| r.pair.as_str()).collect();
    assert_eq!(pairs, vec!["b←y", "a←x", "c←z"]);

    let scoped = repo.entries(&user, Some("A")).await.unwrap();
    assert_eq!(scoped.len(), 2);

    repo.rename_entry(&user, "A", "b←y", "bb←y").await.unwrap();
    let renamed = repo.entries(&user, Some("A")).await.unwrap();
    assert_eq!(renamed[0].pair, "bb←y");
    assert_eq!(renamed[0].count, 3);

    assert_eq!(
        repo.categories_with_mistakes(&user).await.unwrap(),
        vec!["A", "B"]
    );
}

#[tokio::test]
async fn sqlite_set_count_lowers_or_removes() {
    let repo = connect("memdb_set_count").await;
    let user = UserId::new("u1");

    for _ in 0..5 {
        repo.increment(&user, "A", "cot←cat").await.unwrap();
    }
    repo.set_count(&user, "A", "cot←cat", 2).await.unwrap();
    let entries = repo.entries(&user, Some("A")).await.unwrap();
    assert_eq!(entries[0].count, 2);

    repo.set_count(&user, "A", "cot←cat", 0).await.unwrap();
    assert!(repo.entries(&user, Some("A")).await.unwrap().is_empty());

    let err = repo.set_count(&user, "A", "cot←cat", 1).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_schedule_toggle_and_lookup() {
    let repo = connect("memdb_schedule").await;
    let user = UserId::new("u1");
    let other = UserId::new("u2");
    let at: ReminderTime = "08:00".parse().unwrap();

    assert_eq!(repo.toggle(&user, at).await.unwrap(), ToggleOutcome::Added);
    assert_eq!(repo.toggle(&other, at).await.unwrap(), ToggleOutcome::Added);
    assert_eq!(
        repo.users_at(at).await.unwrap(),
        vec![UserId::new("u1"), UserId::new("u2")]
    );

    assert_eq!(
        repo.toggle(&user, at).await.unwrap(),
        ToggleOutcome::Removed
    );
    assert_eq!(repo.users_at(at).await.unwrap(), vec![UserId::new("u2")]);
    assert!(repo.times(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_pool_and_contributors() {
    let repo = connect("memdb_pool").await;
    let user = UserId::new("u1");

    assert!(!repo.is_contributor(&user).await.unwrap());
    repo.add_contributor(&user).await.unwrap();
    repo.add_contributor(&user).await.unwrap();
    assert!(repo.is_contributor(&user).await.unwrap());

    repo.add_to_pool("A", &question("cat", "felis")).await.unwrap();
    repo.add_to_pool("B", &question("dog", "canis")).await.unwrap();
    let pool = repo.pool_questions().await.unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[0].pair_key(), "cat←felis");
}
