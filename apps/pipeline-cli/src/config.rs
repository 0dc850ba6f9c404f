use std::path::PathBuf;

use anyhow::{Result, anyhow};
use platform_store::StoreSettings;
use products_crm::RepositoryConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub user_id: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let data_dir = StoreSettings::from_env().data_dir();
        let user_id = std::env::var("PIPELINE_USER_ID").unwrap_or_else(|_| "ceo".into());
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(anyhow!("PIPELINE_USER_ID must not be blank"));
        }
        Ok(Self { data_dir, user_id })
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn repository(&self) -> RepositoryConfig {
        RepositoryConfig::default().with_user(self.user_id.clone())
    }
}
