#![forbid(unsafe_code)]

pub mod async_transport;
pub mod catalog;
pub mod kraft;
pub mod transport;

pub use async_transport::BrokerServer;
pub use catalog::{bootstrap, CatalogError, TopicCatalog, TopicMeta};
pub use minka_storage::{PartitionStore, StorageError};
pub use transport::{Broker, TransportError};
