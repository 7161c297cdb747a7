//! `manageTestConfig`: CRUD over named JSON configurations, one file per
//! name under a storage directory.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::Tool;
use crate::types::{Error, Result};
use crate::validation::{validate_file_name, validate_no_parent_components};

const CONFIG_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl ConfigAction {
    fn as_str(self) -> &'static str {
        match self {
            ConfigAction::Create => "create",
            ConfigAction::Read => "read",
            ConfigAction::Update => "update",
            ConfigAction::Delete => "delete",
            ConfigAction::List => "list",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageTestConfigInput {
    pub action: ConfigAction,
    /// Required for everything but `list`.
    #[serde(default)]
    pub config_name: Option<String>,
    /// Required for `create` and `update`.
    #[serde(default)]
    pub config_data: Option<Map<String, Value>>,
    /// Overrides the configured storage directory.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageTestConfigOutput {
    pub status: StoreStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configs_list: Option<Vec<String>>,
}

impl ManageTestConfigOutput {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: StoreStatus::Failure,
            message: message.into(),
            config_name: None,
            config_data: None,
            configs_list: None,
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Self {
            status: StoreStatus::Success,
            ..Self::failure(message)
        }
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    default_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(default_dir: PathBuf) -> Self {
        Self { default_dir }
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    fn storage_root(&self, requested: Option<&Path>) -> Result<PathBuf> {
        match requested {
            Some(path) => {
                validate_no_parent_components(path, "storagePath")?;
                Ok(path.to_path_buf())
            }
            None => Ok(self.default_dir.clone()),
        }
    }

    async fn dispatch(
        &self,
        root: &Path,
        input: ManageTestConfigInput,
    ) -> Result<ManageTestConfigOutput> {
        let action = input.action;
        if action == ConfigAction::List {
            return list(root).await;
        }

        let Some(name) = input.config_name else {
            return Ok(ManageTestConfigOutput::failure(format!(
                "configName is required for action \"{}\".",
                action.as_str()
            )));
        };
        let path = resolve_config_path(root, &name)?;

        match action {
            ConfigAction::Create | ConfigAction::Update => {
                let Some(data) = input.config_data else {
                    return Ok(ManageTestConfigOutput::failure(format!(
                        "configName and configData are required for action \"{}\".",
                        action.as_str()
                    )));
                };
                if action == ConfigAction::Create {
                    create(&path, name, data).await
                } else {
                    update(&path, name, data).await
                }
            }
            ConfigAction::Read => read(&path, name).await,
            ConfigAction::Delete => delete(&path, name).await,
            ConfigAction::List => list(root).await,
        }
    }
}

/// Resolve `name` to a file directly inside `root`.
fn resolve_config_path(root: &Path, name: &str) -> Result<PathBuf> {
    validate_file_name(name, "configName")?;
    let file_name = if name.ends_with(".json") {
        name.to_string()
    } else {
        format!("{}.{}", name, CONFIG_EXTENSION)
    };
    let path = root.join(file_name);
    if path.parent() != Some(root) {
        return Err(Error::validation(format!(
            "configName leads outside the storage directory: '{}'",
            name
        )));
    }
    Ok(path)
}

fn render(data: &Map<String, Value>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(data)?)
}

async fn create(
    path: &Path,
    name: String,
    data: Map<String, Value>,
) -> Result<ManageTestConfigOutput> {
    let opened = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;
    let mut file = match opened {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::warn!("config {} already exists at {}", name, path.display());
            return Ok(ManageTestConfigOutput::failure(format!(
                "Configuration \"{}\" already exists.",
                name
            )));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(&render(&data)?).await?;
    file.flush().await?;
    tracing::info!("created config {} at {}", name, path.display());

    Ok(ManageTestConfigOutput {
        config_name: Some(name.clone()),
        config_data: Some(data),
        ..ManageTestConfigOutput::success(format!("Configuration \"{}\" created.", name))
    })
}

async fn read(path: &Path, name: String) -> Result<ManageTestConfigOutput> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(not_found(&name, path)),
        Err(e) => return Err(e.into()),
    };
    let data: Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(e) => {
            return Ok(ManageTestConfigOutput::failure(format!(
                "Configuration \"{}\" is not a JSON object: {}",
                name, e
            )))
        }
    };
    Ok(ManageTestConfigOutput {
        config_name: Some(name.clone()),
        config_data: Some(data),
        ..ManageTestConfigOutput::success(format!("Configuration \"{}\" read.", name))
    })
}

async fn update(
    path: &Path,
    name: String,
    data: Map<String, Value>,
) -> Result<ManageTestConfigOutput> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(not_found(&name, path));
    }
    // last writer wins
    tokio::fs::write(path, render(&data)?).await?;
    tracing::info!("updated config {} at {}", name, path.display());
    Ok(ManageTestConfigOutput {
        config_name: Some(name.clone()),
        config_data: Some(data),
        ..ManageTestConfigOutput::success(format!("Configuration \"{}\" updated.", name))
    })
}

async fn delete(path: &Path, name: String) -> Result<ManageTestConfigOutput> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!("deleted config {} at {}", name, path.display());
            Ok(ManageTestConfigOutput::success(format!(
                "Configuration \"{}\" deleted.",
                name
            )))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(not_found(&name, path)),
        Err(e) => Err(e.into()),
    }
}

async fn list(root: &Path) -> Result<ManageTestConfigOutput> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CONFIG_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    tracing::debug!("listed {} config(s) in {}", names.len(), root.display());
    Ok(ManageTestConfigOutput {
        configs_list: Some(names),
        ..ManageTestConfigOutput::success("Configurations listed.")
    })
}

fn not_found(name: &str, path: &Path) -> ManageTestConfigOutput {
    tracing::warn!("config {} not found at {}", name, path.display());
    ManageTestConfigOutput::failure(format!("Configuration \"{}\" not found.", name))
}

#[async_trait]
impl Tool for ConfigStore {
    type Input = ManageTestConfigInput;
    type Output = ManageTestConfigOutput;

    const NAME: &'static str = "manageTestConfig";
    const DESCRIPTION: &'static str =
        "Manages named test configurations (create, read, update, delete, list).";

    async fn run(&self, input: Self::Input) -> Result<Self::Output> {
        tracing::info!(
            "manageTestConfig action={} name={:?}",
            input.action.as_str(),
            input.config_name
        );
        let root = match self.storage_root(input.storage_path.as_deref()) {
            Ok(root) => root,
            Err(e) => return Ok(ManageTestConfigOutput::failure(e.to_string())),
        };
        if let Err(e) = tokio::fs::create_dir_all(&root).await {
            tracing::error!("cannot create storage path {}: {}", root.display(), e);
            return Ok(ManageTestConfigOutput::failure(format!(
                "Could not create or access storage path {}: {}",
                root.display(),
                e
            )));
        }

        let action = input.action;
        match self.dispatch(&root, input).await {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::error!("manageTestConfig {} failed: {}", action.as_str(), e);
                Ok(ManageTestConfigOutput::failure(format!(
                    "Action \"{}\" failed: {}",
                    action.as_str(),
                    e
                )))
            }
        }
    }
}
