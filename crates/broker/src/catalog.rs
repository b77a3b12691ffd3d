#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use minka_protocol::parse_uuid;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::kraft;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog {operation} failed on {path}: {message}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        message: String,
    },
    #[error("no topics recovered from the cluster metadata log")]
    NoTopics,
}

impl CatalogError {
    pub(crate) fn io(operation: &'static str, path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopicMeta {
    pub id: Uuid,
    pub partition_count: u32,
}

impl TopicMeta {
    /// A topic with no recorded partitions still answers for partition 0.
    pub fn effective_partition_count(&self) -> u32 {
        self.partition_count.max(1)
    }
}

/// Immutable topic catalog: name to metadata, with a reverse index from
/// topic UUID to name for Fetch lookups. Populated once at startup and
/// shared read-only across connections.
#[derive(Debug, Clone, Default)]
pub struct TopicCatalog {
    by_name: BTreeMap<String, TopicMeta>,
    names_by_id: BTreeMap<Uuid, String>,
}

impl TopicCatalog {
    pub fn from_topics(topics: BTreeMap<String, TopicMeta>) -> Self {
        let mut names_by_id = BTreeMap::new();
        for (name, meta) in &topics {
            names_by_id.insert(meta.id, name.clone());
        }
        Self {
            by_name: topics,
            names_by_id,
        }
    }

    pub fn get(&self, name: &str) -> Option<&TopicMeta> {
        self.by_name.get(name)
    }

    pub fn name_by_id(&self, id: &Uuid) -> Option<&str> {
        self.names_by_id.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Build the catalog from the cluster metadata log, falling back to the
/// properties file, and finally to an empty catalog.
pub fn bootstrap(metadata_log: &Path, properties: Option<&Path>) -> TopicCatalog {
    match kraft::load_cluster_metadata(metadata_log) {
        Ok(catalog) => {
            info!(
                topics = catalog.len(),
                path = %metadata_log.display(),
                "loaded topic catalog from cluster metadata log"
            );
            return catalog;
        }
        Err(err) => {
            info!(error = %err, "cluster metadata log unavailable");
        }
    }

    if let Some(path) = properties {
        match load_properties(path) {
            Ok(catalog) => {
                info!(
                    topics = catalog.len(),
                    path = %path.display(),
                    "loaded topic catalog from properties file"
                );
                return catalog;
            }
            Err(err) => {
                warn!(error = %err, "failed to load properties file");
            }
        }
    }

    info!("starting with an empty topic catalog");
    TopicCatalog::default()
}

pub fn load_properties(path: &Path) -> Result<TopicCatalog, CatalogError> {
    let content =
        fs::read_to_string(path).map_err(|err| CatalogError::io("read", path, err))?;
    Ok(TopicCatalog::from_topics(parse_properties(&content)))
}

/// Parse `topic.<name>.id=` / `topic.<name>.partitions=` lines. `<name>` may
/// contain dots; the last dot separates name from field. Malformed values
/// are warned about and skipped; everything valid accumulates into the map
/// that is committed as a whole.
pub fn parse_properties(content: &str) -> BTreeMap<String, TopicMeta> {
    let mut topics: BTreeMap<String, TopicMeta> = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || !line.starts_with("topic.") {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let Some(rest) = key.strip_prefix("topic.") else {
            continue;
        };
        let Some(dot) = rest.rfind('.') else {
            continue;
        };
        if dot == 0 || dot == rest.len() - 1 {
            continue;
        }
        let (name, field) = (&rest[..dot], &rest[dot + 1..]);

        let entry = topics.entry(name.to_string()).or_default();
        match field {
            "id" => match parse_uuid(value) {
                Ok(id) => entry.id = id,
                Err(err) => {
                    warn!(topic = name, error = %err, "invalid uuid in properties file");
                }
            },
            "partitions" => match value.parse::<u32>() {
                Ok(count) => entry.partition_count = count,
                Err(_) => {
                    warn!(topic = name, value, "invalid partition count in properties file");
                }
            },
            _ => {}
        }
    }
    topics
}
