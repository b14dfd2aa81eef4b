//! Connection provider: adapter registry plus the established connection.

use std::collections::HashMap;
use std::fmt;

use sqlrecord_core::{ConfigErrorKind, Connection, ConnectionConfig, Error, Result};

/// Opens a connection for a configuration.
pub type AdapterFactory = Box<dyn Fn(&ConnectionConfig) -> Result<Box<dyn Connection>>>;

/// Owns the adapter registry and at most one established connection.
///
/// Retrieving the connection before [`ConnectionProvider::establish_connection`]
/// is a configuration error.
#[derive(Default)]
pub struct ConnectionProvider {
    adapters: HashMap<String, AdapterFactory>,
    connection: Option<Box<dyn Connection>>,
    config: Option<ConnectionConfig>,
}

impl fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adapters: Vec<_> = self.adapters.keys().collect();
        adapters.sort();
        f.debug_struct("ConnectionProvider")
            .field("adapters", &adapters)
            .field("connected", &self.connection.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl ConnectionProvider {
    /// Create a provider with no adapters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter factory under a name.
    pub fn register_adapter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectionConfig) -> Result<Box<dyn Connection>> + 'static,
    {
        self.adapters.insert(name.into(), Box::new(factory));
    }

    /// Names of registered adapters.
    pub fn adapters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open a connection through the adapter named by `config`.
    ///
    /// Replaces any previously established connection.
    #[tracing::instrument(level = "debug", skip(self, config), fields(adapter = ?config.adapter))]
    pub fn establish_connection(&mut self, config: ConnectionConfig) -> Result<()> {
        let Some(adapter) = config.adapter.as_deref() else {
            return Err(Error::config(
                ConfigErrorKind::AdapterNotFound,
                "database configuration does not specify adapter",
            ));
        };
        let Some(factory) = self.adapters.get(adapter) else {
            return Err(Error::config(
                ConfigErrorKind::AdapterNotFound,
                format!("database configuration specifies nonexistent {adapter} adapter"),
            ));
        };

        let connection = factory(&config)?;
        tracing::info!(adapter = adapter, database = ?config.database, "Connection established");
        self.connection = Some(connection);
        self.config = Some(config);
        Ok(())
    }

    /// Install an already opened connection.
    pub fn set_connection(&mut self, connection: Box<dyn Connection>) {
        self.connection = Some(connection);
        self.config = None;
    }

    /// The established connection.
    pub fn connection(&self) -> Result<&dyn Connection> {
        self.connection.as_deref().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::ConnectionNotEstablished,
                "connection has not been established",
            )
        })
    }

    /// Whether a connection is established.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Configuration of the established connection, if it was opened through
    /// an adapter.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Close and forget the connection, returning its configuration.
    pub fn remove_connection(&mut self) -> Option<ConnectionConfig> {
        if self.connection.take().is_some() {
            tracing::info!("Connection removed");
        }
        self.config.take()
    }
}
