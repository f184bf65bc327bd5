use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use ovo::{
    Bcrypt, EntityId, EntityStore, GameId, GameIdParseError, IdAllocator, InMemoryEntityStore,
    NewComment, NewTask,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn store() -> InMemoryEntityStore {
    InMemoryEntityStore::new(IdAllocator::default(), Arc::new(Bcrypt::CHEAPEST))
}

fn multiset(ids: &[EntityId]) -> HashMap<EntityId, usize> {
    let mut counts = HashMap::new();
    for id in ids {
        *counts.entry(id.clone()).or_insert(0) += 1;
    }
    counts
}

proptest! {
    #[test]
    fn valid_game_ids_round_trip(id in "[A-Za-z0-9_]{1,59}") {
        let game = GameId::new(&id).unwrap();
        prop_assert_eq!(game.as_str(), id.as_str());
        prop_assert_eq!(GameId::from_schema_name(&game.schema_name()), Some(game));
    }

    #[test]
    fn game_ids_with_other_characters_are_rejected(
        prefix in "[A-Za-z0-9_]{0,10}",
        bad in "[^A-Za-z0-9_]",
        suffix in "[A-Za-z0-9_]{0,10}",
    ) {
        let id = format!("{}{}{}", prefix, bad, suffix);
        let rejected = matches!(
            GameId::new(&id),
            Err(GameIdParseError::InvalidCharacter(_)) | Err(GameIdParseError::TooLong(_))
        );
        prop_assert!(rejected);
    }

    #[test]
    fn entity_ids_never_parse_from_short_strings(s in "[0-9a-f]{0,127}") {
        prop_assert!(s.parse::<EntityId>().is_err());
    }

    #[test]
    fn remove_task_returns_multiset_union(
        // each inner vec is one comment's attachments, as indexes into the file pool
        comments in prop::collection::vec(prop::collection::vec(0usize..4, 0..5), 0..6),
        foreign in prop::collection::vec(0usize..4, 0..3),
    ) {
        runtime().block_on(async {
            let store = store();
            let task = store.add_task(&NewTask::named("target")).await.unwrap();
            let other = store.add_task(&NewTask::named("other")).await.unwrap();
            let mut files = Vec::new();
            for i in 0..4 {
                files.push(store.add_file(&format!("f{}", i)).await.unwrap());
            }

            let mut expected = Vec::new();
            let mut comment_ids = Vec::new();
            for attachments in &comments {
                let attached: Vec<EntityId> =
                    attachments.iter().map(|i| files[*i].clone()).collect();
                expected.extend(attached.iter().cloned());
                comment_ids.push(
                    store
                        .add_comment(&NewComment {
                            task_id: task.clone(),
                            user_id: "alice".into(),
                            text: None,
                            attached_files: attached,
                        })
                        .await
                        .unwrap(),
                );
            }
            store
                .add_comment(&NewComment {
                    task_id: other.clone(),
                    user_id: "bob".into(),
                    text: None,
                    attached_files: foreign.iter().map(|i| files[*i].clone()).collect(),
                })
                .await
                .unwrap();

            let removed = store.remove_task(&task).await.unwrap();
            assert_eq!(multiset(&removed), multiset(&expected));
            assert!(store.get_task(&task).await.unwrap().is_none());
            for id in &comment_ids {
                assert!(store.get_comment(id).await.unwrap().is_none());
            }
            assert_eq!(store.list_comments().await.unwrap().len(), 1);
        });
    }

    #[test]
    fn take_then_reject_restores_solvings(
        pairs in prop::collection::vec((0usize..3, "[a-c]"), 0..6),
        pair in (0usize..3, "[a-c]"),
    ) {
        runtime().block_on(async {
            let store = store();
            let mut tasks = Vec::new();
            for i in 0..3 {
                tasks.push(store.add_task(&NewTask::named(format!("t{}", i))).await.unwrap());
            }
            for (task, user) in &pairs {
                // duplicates in the generated pairs surface as conflicts; ignore them
                let _ = store.take_task(&tasks[*task], user).await;
            }
            let before = store.list_solvings().await.unwrap();
            let (task, user) = &pair;
            if before.iter().any(|s| s.task_id == tasks[*task] && &s.user_id == user) {
                return;
            }

            store.take_task(&tasks[*task], user).await.unwrap();
            assert!(store.take_task(&tasks[*task], user).await.is_err());
            store.reject_task(&tasks[*task], user).await.unwrap();
            assert_eq!(store.list_solvings().await.unwrap(), before);
        });
    }
}
