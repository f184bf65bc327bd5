//! Which games exist, and their per-game configuration record.
//!
//! A game's namespace is its isolated storage: the entity tables plus exactly one
//! [`GameInfo`] record. The namespace existing is what "the game exists" means.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    EntityStore, GameId, GameInfo, GameInfoPatch, IdAllocator, InMemoryEntityStore, OvoError,
    SecretHasher,
};

pub trait GameRegistry: Send + Sync {
    /// Store type handed out for a game's entity tables.
    type Entities: EntityStore;

    fn exists(&self, game: &GameId) -> impl Future<Output = Result<bool, OvoError>> + Send;

    /// Every game with a namespace, sorted by id.
    fn list(&self) -> impl Future<Output = Result<Vec<GameId>, OvoError>> + Send;

    /// Creates the namespace with empty entity tables and no configuration record.
    ///
    /// `AlreadyExists` when the namespace is already there.
    fn create_namespace(&self, game: &GameId) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// Irrevocably removes the namespace and everything in it.
    fn drop_namespace(&self, game: &GameId) -> impl Future<Output = Result<(), OvoError>> + Send;

    fn insert_game_info(
        &self,
        game: &GameId,
        info: &GameInfo,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// Overwrites only the fields the patch carries.
    fn update_game_info(
        &self,
        game: &GameId,
        patch: &GameInfoPatch,
    ) -> impl Future<Output = Result<(), OvoError>> + Send;

    /// `NotFound` when the namespace is missing or holds no record.
    fn game_info(&self, game: &GameId) -> impl Future<Output = Result<GameInfo, OvoError>> + Send;

    /// Handle on the entity tables of an existing namespace.
    fn entities(&self, game: &GameId) -> Result<Self::Entities, OvoError>;
}

///////////////////////////////////////// InMemoryGameRegistry /////////////////////////////////////

struct Namespace {
    info: Option<GameInfo>,
    entities: InMemoryEntityStore,
}

/// In-memory [`GameRegistry`]; clones share the same namespaces.
#[derive(Clone)]
pub struct InMemoryGameRegistry {
    games: Arc<Mutex<HashMap<GameId, Namespace>>>,
    ids: IdAllocator,
    hasher: Arc<dyn SecretHasher>,
}

impl InMemoryGameRegistry {
    pub fn new(ids: IdAllocator, hasher: Arc<dyn SecretHasher>) -> Self {
        Self {
            games: Arc::new(Mutex::new(HashMap::new())),
            ids,
            hasher,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<GameId, Namespace>>, OvoError> {
        self.games
            .lock()
            .map_err(|_| OvoError::Internal("game registry lock poisoned".to_string()))
    }
}

fn no_game(game: &GameId) -> OvoError {
    OvoError::NotFound(format!("game {}", game))
}

impl GameRegistry for InMemoryGameRegistry {
    type Entities = InMemoryEntityStore;

    async fn exists(&self, game: &GameId) -> Result<bool, OvoError> {
        Ok(self.lock()?.contains_key(game))
    }

    async fn list(&self) -> Result<Vec<GameId>, OvoError> {
        let mut games: Vec<GameId> = self.lock()?.keys().cloned().collect();
        games.sort();
        Ok(games)
    }

    async fn create_namespace(&self, game: &GameId) -> Result<(), OvoError> {
        let mut games = self.lock()?;
        if games.contains_key(game) {
            return Err(OvoError::AlreadyExists(format!("game {}", game)));
        }
        games.insert(
            game.clone(),
            Namespace {
                info: None,
                entities: InMemoryEntityStore::new(self.ids.clone(), self.hasher.clone()),
            },
        );
        Ok(())
    }

    async fn drop_namespace(&self, game: &GameId) -> Result<(), OvoError> {
        self.lock()?
            .remove(game)
            .map(|_| ())
            .ok_or_else(|| no_game(game))
    }

    async fn insert_game_info(&self, game: &GameId, info: &GameInfo) -> Result<(), OvoError> {
        let mut games = self.lock()?;
        let namespace = games.get_mut(game).ok_or_else(|| no_game(game))?;
        if namespace.info.is_some() {
            return Err(OvoError::AlreadyExists(format!(
                "configuration of game {}",
                game
            )));
        }
        namespace.info = Some(info.clone());
        Ok(())
    }

    async fn update_game_info(&self, game: &GameId, patch: &GameInfoPatch) -> Result<(), OvoError> {
        let mut games = self.lock()?;
        let info = games
            .get_mut(game)
            .and_then(|namespace| namespace.info.as_mut())
            .ok_or_else(|| no_game(game))?;
        patch.apply(info);
        Ok(())
    }

    async fn game_info(&self, game: &GameId) -> Result<GameInfo, OvoError> {
        self.lock()?
            .get(game)
            .and_then(|namespace| namespace.info.clone())
            .ok_or_else(|| OvoError::NotFound(format!("configuration of game {}", game)))
    }

    fn entities(&self, game: &GameId) -> Result<InMemoryEntityStore, OvoError> {
        self.lock()?
            .get(game)
            .map(|namespace| namespace.entities.clone())
            .ok_or_else(|| no_game(game))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{Bcrypt, NewTask};

    fn registry() -> InMemoryGameRegistry {
        InMemoryGameRegistry::new(IdAllocator::default(), Arc::new(Bcrypt::CHEAPEST))
    }

    fn info() -> GameInfo {
        GameInfo {
            port: 5000,
            files_folder: PathBuf::from("/srv/ovo/g1"),
            register_pass: "h1".into(),
            captain_pass: "h2".into(),
            judge_url: None,
            judge_login: None,
            judge_pass: None,
        }
    }

    #[tokio::test]
    async fn create_then_drop() {
        let registry = registry();
        let game = GameId::new("G1").unwrap();
        assert!(!registry.exists(&game).await.unwrap());
        registry.create_namespace(&game).await.unwrap();
        assert!(registry.exists(&game).await.unwrap());
        assert!(matches!(
            registry.create_namespace(&game).await,
            Err(OvoError::AlreadyExists(_))
        ));
        registry.drop_namespace(&game).await.unwrap();
        assert!(!registry.exists(&game).await.unwrap());
        assert!(matches!(
            registry.drop_namespace(&game).await,
            Err(OvoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fresh_namespace_has_no_record() {
        let registry = registry();
        let game = GameId::new("G1").unwrap();
        registry.create_namespace(&game).await.unwrap();
        assert!(matches!(
            registry.game_info(&game).await,
            Err(OvoError::NotFound(_))
        ));
        registry.insert_game_info(&game, &info()).await.unwrap();
        assert_eq!(registry.game_info(&game).await.unwrap(), info());
        assert!(matches!(
            registry.insert_game_info(&game, &info()).await,
            Err(OvoError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn update_touches_only_patched_fields() {
        let registry = registry();
        let game = GameId::new("G1").unwrap();
        registry.create_namespace(&game).await.unwrap();
        registry.insert_game_info(&game, &info()).await.unwrap();
        registry
            .update_game_info(
                &game,
                &GameInfoPatch {
                    port: Some(6000),
                    ..GameInfoPatch::default()
                },
            )
            .await
            .unwrap();
        let updated = registry.game_info(&game).await.unwrap();
        assert_eq!(updated.port, 6000);
        assert_eq!(updated.files_folder, info().files_folder);
        assert_eq!(updated.register_pass, "h1");
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let registry = registry();
        let g1 = GameId::new("G1").unwrap();
        let g2 = GameId::new("G2").unwrap();
        registry.create_namespace(&g1).await.unwrap();
        registry.create_namespace(&g2).await.unwrap();
        registry
            .entities(&g1)
            .unwrap()
            .add_task(&NewTask::named("only in g1"))
            .await
            .unwrap();
        assert_eq!(registry.entities(&g1).unwrap().list_tasks().await.unwrap().len(), 1);
        assert!(registry.entities(&g2).unwrap().list_tasks().await.unwrap().is_empty());
        assert_eq!(registry.list().await.unwrap(), vec![g1, g2]);
    }
}
