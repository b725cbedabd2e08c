use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::core::db::{seed_demo_data, Store};
use crate::uploads::{storage_from_config, ImageStorage};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub images: Arc<dyn ImageStorage>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::open(&config.database_url)?;
        let images = storage_from_config(&config.image_storage)?;

        if config.seed_demo {
            seed_demo_data(&store)?;
        }

        info!("Image storage: {}", images.name());
        Ok(Self::with_parts(config, store, images))
    }

    pub fn with_parts(config: Config, store: Store, images: Arc<dyn ImageStorage>) -> Self {
        Self { config, store, images }
    }
}
