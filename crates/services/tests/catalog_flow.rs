use std::sync::Arc;

use orfo_core::fixed_clock;
use orfo_core::model::UserId;
use services::catalog::{DeleteOutcome, DeleteTarget};
use services::global::GlobalOutcome;
use services::{AppServices, CatalogError, GlobalGameError, NullNotifier, Session};
use storage::repository::{CategoryRepository, LedgerRepository, PoolRepository, Storage};

fn build() -> (AppServices, Storage) {
    let storage = Storage::in_memory();
    let services = AppServices::new(&storage, fixed_clock(), Arc::new(NullNotifier));
    (services, storage)
}

#[tokio::test]
async fn create_add_and_search() {
    let (services, _storage) = build();
    let user = UserId::new("u1");

    let name = services.catalog().create_category(&user, "  Unit 1 ").await.unwrap();
    assert_eq!(name, "Unit 1");

    let err = services.catalog().create_category(&user, "Unit 1").await.unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateCategory(_)));

    services
        .catalog()
        .add_question(&user, "Unit 1", "cot\ncat")
        .await
        .unwrap();
    services
        .catalog()
        .add_question(&user, "Unit 1", "dogg\ndog")
        .await
        .unwrap();

    let found = services.catalog().search(&user, "Unit 1", "CAT").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].pair_key(), "cot←cat");

    let err = services
        .catalog()
        .add_question(&user, "Unit 1", "just one line")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Question(_)));

    let err = services
        .catalog()
        .add_question(&user, "Missing", "a\nb")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownCategory(_)));
}

#[tokio::test]
async fn category_names_are_naturally_sorted() {
    let (services, _storage) = build();
    let user = UserId::new("u1");
    for name in ["Unit 10", "Unit 2", "Unit 1"] {
        services.catalog().create_category(&user, name).await.unwrap();
    }
    assert_eq!(
        services.catalog().category_names(&user).await.unwrap(),
        vec!["Unit 1", "Unit 2", "Unit 10"]
    );
}

#[tokio::test]
async fn bulk_add_keeps_good_blocks_and_reports_bad_ones() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();

    let outcome = services
        .catalog()
        .add_questions_bulk(&user, "A", "cot\ncat\n\nonly-one-line\n\ndogg\ndog")
        .await
        .unwrap();
    assert_eq!(outcome.added.len(), 2);
    assert_eq!(outcome.rejected.len(), 1);

    let cat = storage.categories.get_category(&user, "A").await.unwrap().unwrap();
    assert_eq!(cat.len(), 2);
}

#[tokio::test]
async fn contributor_additions_are_mirrored_into_the_pool() {
    let (services, storage) = build();
    let insider = UserId::new("insider");
    let outsider = UserId::new("outsider");
    storage.pool.add_contributor(&insider).await.unwrap();

    for user in [&insider, &outsider] {
        services.catalog().create_category(user, "A").await.unwrap();
        services
            .catalog()
            .add_question(user, "A", "cot\ncat")
            .await
            .unwrap();
    }

    let pool = storage.pool.pool_questions().await.unwrap();
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn edit_flow_replaces_text_and_keeps_the_ledger_count() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();
    services
        .catalog()
        .add_question(&user, "A", "cot\ncat")
        .await
        .unwrap();
    storage.ledger.increment(&user, "A", "cot←cat").await.unwrap();
    storage.ledger.increment(&user, "A", "cot←cat").await.unwrap();

    let page = services.catalog().begin_edit(&user, "A", "cot").await.unwrap();
    assert_eq!(page.items.len(), 1);
    let token = page.items[0].token.clone();

    let current = services.catalog().choose_edit(&user, &token).await.unwrap();
    assert_eq!(current.pair_key(), "cot←cat");

    // Bad input keeps the flow alive for a retry.
    let err = services.catalog().apply_edit(&user, "single line").await.unwrap_err();
    assert!(matches!(err, CatalogError::Question(_)));

    let updated = services.catalog().apply_edit(&user, "kot\ncat").await.unwrap();
    assert_eq!(updated.pair_key(), "kot←cat");

    let cat = storage.categories.get_category(&user, "A").await.unwrap().unwrap();
    assert_eq!(cat.questions()[0].pair_key(), "kot←cat");

    let entries = storage.ledger.entries(&user, Some("A")).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].pair, "kot←cat");
    assert_eq!(entries[0].count, 2);
}

#[tokio::test]
async fn stale_tokens_are_recoverable() {
    let (services, _storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();
    services
        .catalog()
        .add_question(&user, "A", "cot\ncat")
        .await
        .unwrap();

    services.catalog().begin_edit(&user, "A", "cot").await.unwrap();
    let err = services
        .catalog()
        .choose_edit(&user, "feedfacefeedface")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Stale));

    // The flow survives a stale pick; a later valid pick still works.
    let page = services.catalog().flow_next_page(&user).await.unwrap();
    let token = page.items[0].token.clone();
    services.catalog().choose_edit(&user, &token).await.unwrap();
}

#[tokio::test]
async fn deleting_the_last_question_prunes_category_and_ledger() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();
    services
        .catalog()
        .add_question(&user, "A", "cot\ncat")
        .await
        .unwrap();
    storage.ledger.increment(&user, "A", "cot←cat").await.unwrap();

    let page = services
        .catalog()
        .begin_delete_question(&user, "A", "cot")
        .await
        .unwrap();
    let token = page.items[0].token.clone();
    let target = services.catalog().request_delete(&user, &token).await.unwrap();
    assert_eq!(
        target,
        DeleteTarget::Question {
            category: "A".into(),
            pair: "cot←cat".into()
        }
    );

    // Anything but 1/0 re-requests confirmation.
    let err = services.catalog().confirm_delete(&user, "yes").await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConfirmation));

    let outcome = services.catalog().confirm_delete(&user, "1").await.unwrap();
    assert!(matches!(outcome, DeleteOutcome::Deleted(_)));

    assert!(storage.categories.get_category(&user, "A").await.unwrap().is_none());
    assert!(storage.ledger.entries(&user, None).await.unwrap().is_empty());
    assert!(services.sessions().get(&user).is_none());
}

#[tokio::test]
async fn cancelled_delete_changes_nothing() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();
    services
        .catalog()
        .add_question(&user, "A", "cot\ncat")
        .await
        .unwrap();

    let page = services.catalog().begin_delete_category(&user).await.unwrap();
    let token = page.items[0].token.clone();
    services.catalog().request_delete(&user, &token).await.unwrap();

    let outcome = services.catalog().confirm_delete(&user, "0").await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert!(storage.categories.get_category(&user, "A").await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_a_category_drops_its_ledger_group() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    services.catalog().create_category(&user, "A").await.unwrap();
    services
        .catalog()
        .add_question(&user, "A", "cot\ncat")
        .await
        .unwrap();
    storage.ledger.increment(&user, "A", "cot←cat").await.unwrap();
    storage.ledger.increment(&user, "B", "x←y").await.unwrap();

    let page = services.catalog().begin_delete_category(&user).await.unwrap();
    let token = page.items[0].token.clone();
    services.catalog().request_delete(&user, &token).await.unwrap();
    services.catalog().confirm_delete(&user, "1").await.unwrap();

    let remaining = storage.ledger.categories_with_mistakes(&user).await.unwrap();
    assert_eq!(remaining, vec!["B"]);
}

//
// ─── GLOBAL GAME ───────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn global_game_walks_the_pool_until_a_wrong_answer() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    let insider = UserId::new("insider");
    storage.pool.add_contributor(&insider).await.unwrap();
    services.catalog().create_category(&insider, "A").await.unwrap();
    services
        .catalog()
        .add_question(&insider, "A", "cot\ncat")
        .await
        .unwrap();
    services
        .catalog()
        .add_question(&insider, "A", "dogg\ndog")
        .await
        .unwrap();

    services.global().start(&user).await.unwrap();

    let Some(Session::GlobalGame(game)) = services.sessions().get(&user) else {
        panic!("expected a global game session");
    };
    let first = game.current_question().unwrap().clone();

    let outcome = services.global().answer(&user, first.back()).await.unwrap();
    let GlobalOutcome::Correct { next: Some(_) } = outcome else {
        panic!("expected the next pooled question");
    };

    let Some(Session::GlobalGame(game)) = services.sessions().get(&user) else {
        panic!("expected the game to continue");
    };
    let second = game.current_question().unwrap().clone();
    assert_ne!(first.pair_key(), second.pair_key());

    // Wrong answer ends the game immediately.
    let outcome = services.global().answer(&user, second.front()).await.unwrap();
    assert_eq!(
        outcome,
        GlobalOutcome::Wrong {
            correct: second.back().to_owned()
        }
    );
    assert!(services.sessions().get(&user).is_none());
}

#[tokio::test]
async fn global_game_ends_on_pool_exhaustion() {
    let (services, storage) = build();
    let user = UserId::new("u1");
    let insider = UserId::new("insider");
    storage.pool.add_contributor(&insider).await.unwrap();
    services.catalog().create_category(&insider, "A").await.unwrap();
    services
        .catalog()
        .add_question(&insider, "A", "cot\ncat")
        .await
        .unwrap();

    services.global().start(&user).await.unwrap();
    let Some(Session::GlobalGame(game)) = services.sessions().get(&user) else {
        panic!("expected a global game session");
    };
    let only = game.current_question().unwrap().clone();

    let outcome = services.global().answer(&user, only.back()).await.unwrap();
    assert_eq!(outcome, GlobalOutcome::Correct { next: None });
    assert!(services.sessions().get(&user).is_none());
}

#[tokio::test]
async fn empty_pool_cannot_start() {
    let (services, _storage) = build();
    let err = services.global().start(&UserId::new("u1")).await.unwrap_err();
    assert!(matches!(err, GlobalGameError::EmptyPool));
}
