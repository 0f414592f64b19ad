use crate::config::{ConfigError, FetcherConfig, Params};
use crate::fetchers::{Fetch, FetchError, parse_scalar};
use core::fmt;
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

const LOG_TARGET: &str = "  postgres";
const DEFAULT_PORT: u16 = 5432;

struct Connection {
    client: Arc<Client>,
    task: JoinHandle<()>,
}

/// Runs SQL queries and reads the first column of the first row.
///
/// The connection is opened on first use and reopened when the server closed it. Concurrent
/// fetches share the same client, whose requests are pipelined.
pub struct PostgresFetcher {
    name: Arc<str>,
    config: tokio_postgres::Config,
    connection: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl fmt::Debug for PostgresFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresFetcher")
            .field("name", &self.name)
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PostgresFetcher {
    pub fn from_config(config: &FetcherConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let entry = format!("Fetchers.{}", config.name);
        let param = |key: &str| config.param(key).ok_or_else(|| ConfigError::missing(&entry, key));

        let port = match config.param("port") {
            None => DEFAULT_PORT,
            Some(port) => port
                .parse()
                .map_err(|e: core::num::ParseIntError| ConfigError::invalid_value(&entry, "port", e.to_string()))?,
        };

        let mut pg = tokio_postgres::Config::new();
        let _ = pg
            .host(param("host")?)
            .port(port)
            .dbname(param("database")?)
            .user(param("user")?)
            .password(param("password")?)
            .application_name("bigeye")
            .connect_timeout(timeout);

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            config: pg,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    async fn client(&self) -> crate::Result<Arc<Client>> {
        if self.closed.load(Ordering::Acquire) {
            bail!("the fetcher has been closed");
        }

        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref()
            && !connection.client.is_closed()
        {
            return Ok(Arc::clone(&connection.client));
        }

        if slot.is_some() {
            log::info!(target: LOG_TARGET, "Connection for fetcher '{}' was closed, reconnecting", self.name);
        } else {
            log::debug!(target: LOG_TARGET, "Opening connection for fetcher '{}'", self.name);
        }

        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .into_app_err("unable to connect to the database")?;

        let name = Arc::clone(&self.name);
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!(target: LOG_TARGET, "Connection for fetcher '{name}' ended: {e}");
            }
        });

        let client = Arc::new(client);
        *slot = Some(Connection {
            client: Arc::clone(&client),
            task,
        });

        Ok(client)
    }

    async fn query_scalar(&self, query: &str) -> crate::Result<f64> {
        let client = self.client().await?;

        log::debug!(target: LOG_TARGET, "Fetcher '{}' running query: {}", self.name, query.trim());

        let messages = client.simple_query(query).await.into_app_err("query failed")?;
        let row = messages
            .iter()
            .find_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .ok_or_else(|| app_err!("query returned no rows"))?;

        let cell = row
            .try_get(0)
            .into_app_err("query returned no columns")?
            .ok_or_else(|| app_err!("query returned NULL"))?;

        parse_scalar(cell)
    }
}

impl Fetch for PostgresFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, params: &Params) -> Result<f64, FetchError> {
        let Some(query) = params.get("query") else {
            return Err(FetchError::new(Arc::clone(&self.name), app_err!("binding has no 'query' parameter")));
        };

        self.query_scalar(query)
            .await
            .map_err(|cause| FetchError::new(Arc::clone(&self.name), cause))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // fetches hold the lock only while connecting, never across teardown
        if let Ok(mut slot) = self.connection.try_lock()
            && let Some(connection) = slot.take()
        {
            log::debug!(target: LOG_TARGET, "Closing connection for fetcher '{}'", self.name);
            connection.task.abort();
        }
    }
}
