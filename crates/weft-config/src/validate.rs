//! Startup configuration validation.
//!
//! Violations here are the only thing that may abort the process (the
//! daemon exits on a validation error; nothing else in the fabric calls
//! exit).

use crate::error::{ConfigError, ConfigResult};
use crate::types::FabricConfig;

/// Validate a fully-merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &FabricConfig) -> ConfigResult<()> {
    validate_node(config)?;
    validate_consumer(config)?;
    validate_producer_batch(config)?;
    validate_batch_writer(config)?;
    validate_dlq(config)?;
    validate_pools(config)?;
    validate_server(config)?;
    Ok(())
}

/// The external queue accepts at most this many entries per batch call and
/// per receive.
const QUEUE_BATCH_LIMIT: usize = 10;

fn validate_node(config: &FabricConfig) -> ConfigResult<()> {
    let n = &config.node;

    if n.node_id.is_empty() {
        return Err(ConfigError::Validation {
            field: "node.node_id".to_owned(),
            message: "node_id must not be empty".to_owned(),
        });
    }

    if n.rooms == 0 {
        return Err(ConfigError::Validation {
            field: "node.rooms".to_owned(),
            message: "rooms must be at least 1".to_owned(),
        });
    }

    Ok(())
}

fn validate_consumer(config: &FabricConfig) -> ConfigResult<()> {
    let c = &config.consumer;

    if c.threads == 0 {
        return Err(ConfigError::Validation {
            field: "consumer.threads".to_owned(),
            message: "threads must be at least 1".to_owned(),
        });
    }

    if c.max_messages == 0 || c.max_messages as usize > QUEUE_BATCH_LIMIT {
        return Err(ConfigError::Validation {
            field: "consumer.max_messages".to_owned(),
            message: format!("max_messages must be between 1 and {QUEUE_BATCH_LIMIT}"),
        });
    }

    Ok(())
}

fn validate_producer_batch(config: &FabricConfig) -> ConfigResult<()> {
    let p = &config.producer_batch;

    if p.max_size == 0 || p.max_size > QUEUE_BATCH_LIMIT {
        return Err(ConfigError::Validation {
            field: "producer_batch.max_size".to_owned(),
            message: format!("max_size must be between 1 and {QUEUE_BATCH_LIMIT}"),
        });
    }

    if p.capacity < p.max_size {
        return Err(ConfigError::Validation {
            field: "producer_batch.capacity".to_owned(),
            message: format!(
                "capacity ({}) must be at least max_size ({})",
                p.capacity, p.max_size
            ),
        });
    }

    Ok(())
}

fn validate_batch_writer(config: &FabricConfig) -> ConfigResult<()> {
    let b = &config.batch_writer;

    if b.size == 0 {
        return Err(ConfigError::Validation {
            field: "batch_writer.size".to_owned(),
            message: "size must be at least 1".to_owned(),
        });
    }

    if b.size > b.buffer_capacity {
        return Err(ConfigError::Validation {
            field: "batch_writer.size".to_owned(),
            message: format!(
                "size ({}) must not exceed buffer_capacity ({})",
                b.size, b.buffer_capacity
            ),
        });
    }

    Ok(())
}

fn validate_dlq(config: &FabricConfig) -> ConfigResult<()> {
    if config.dlq.enabled && config.dlq.queue_name.is_empty() {
        return Err(ConfigError::Validation {
            field: "dlq.queue_name".to_owned(),
            message: "queue_name must not be empty when the DLQ is enabled".to_owned(),
        });
    }
    Ok(())
}

fn validate_pools(config: &FabricConfig) -> ConfigResult<()> {
    if config.write_serializer.worker_threads == 0 {
        return Err(ConfigError::Validation {
            field: "write_serializer.worker_threads".to_owned(),
            message: "worker_threads must be at least 1".to_owned(),
        });
    }

    if config.session.write_queue_capacity == 0 {
        return Err(ConfigError::Validation {
            field: "session.write_queue_capacity".to_owned(),
            message: "write_queue_capacity must be at least 1".to_owned(),
        });
    }

    Ok(())
}

fn validate_server(config: &FabricConfig) -> ConfigResult<()> {
    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Validation {
            field: "server.bind".to_owned(),
            message: format!("'{}' is not a host:port address", config.server.bind),
        });
    }
    Ok(())
}
