//! TCP Server for FragDB
//!
//! This module implements a line-oriented TCP server. Each line is one
//! query, optionally followed by a TAB and a `type:payload|...` list of
//! positional binary arguments. Lines starting with `.` are session
//! commands.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::executor::{EngineContext, QueryResult, Session};
use crate::query::BinaryArg;

/// Default server port
pub const DEFAULT_PORT: u16 = 7171;

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Directory for fragment images and the catalog; in-memory when unset
    pub data_dir: Option<PathBuf>,
    /// Extra symbol-table slots per evaluation
    pub symtable_headroom: usize,
    /// Initial output format of new sessions
    pub output_format: OutputFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
            data_dir: None,
            symtable_headroom: 0,
            output_format: OutputFormat::Table,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection limit
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Persist data under `dir`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn symtable_headroom(mut self, headroom: usize) -> Self {
        self.symtable_headroom = headroom;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Get the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the engine this configuration describes
    pub fn build_engine(&self) -> Result<EngineContext> {
        let engine = match &self.data_dir {
            Some(dir) => EngineContext::open(dir)?,
            None => EngineContext::in_memory(),
        };
        Ok(engine.with_headroom(self.symtable_headroom))
    }
}

/// Parsed connection URL components
/// Format: scheme://host[:port][/path]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionUrl {
    /// URL scheme (e.g., "fragdb")
    pub scheme: String,
    /// Host address
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Path component, used as the data directory
    pub path: String,
}

impl ConnectionUrl {
    /// Parse a connection URL string
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::ParseError("invalid URL: missing scheme".to_string()))?;

        let (host_port, path) = match rest.split_once('/') {
            Some((hp, p)) => (hp, p),
            None => (rest, ""),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((h, p)) if !h.contains('[') => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| Error::ParseError(format!("invalid port: {}", p)))?;
                (h.to_string(), Some(port))
            }
            _ => (host_port.to_string(), None),
        };
        if host.is_empty() {
            return Err(Error::ParseError("invalid URL: missing host".to_string()));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
            path: path.to_string(),
        })
    }

    /// Convert to ServerConfig
    pub fn to_server_config(&self) -> ServerConfig {
        let config = ServerConfig::new()
            .host(self.host.clone())
            .port(self.port.unwrap_or(DEFAULT_PORT));
        if self.path.is_empty() {
            config
        } else {
            config.data_dir(&self.path)
        }
    }
}

/// FragDB TCP Server
pub struct Server {
    config: ServerConfig,
    engine: Arc<EngineContext>,
}

impl Server {
    /// Create a new server
    pub fn new(config: ServerConfig) -> Result<Self> {
        let engine = Arc::new(config.build_engine()?);
        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    /// Start the server and serve connections until the task is cancelled
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!(address = %self.config.bind_address(), "FragDB server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let limit = Arc::new(Semaphore::new(self.config.max_connections.max(1)));

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let permit = match Arc::clone(&limit).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%peer, "connection limit reached, rejecting client");
                    let mut stream = stream;
                    let _ = stream.write_all(b"Error: too many connections\n").await;
                    continue;
                }
            };

            let engine = Arc::clone(&self.engine);
            let format = self.config.output_format;
            tokio::spawn(async move {
                info!(%peer, "client connected");
                if let Err(e) = handle_connection(stream, engine, format).await {
                    error!(%peer, error = %e, "connection error");
                }
                info!(%peer, "client disconnected");
                drop(permit);
            });
        }
    }
}

/// Outcome of one protocol line
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Send this text and keep reading
    Text(String),
    /// Send this text and close the connection
    Close(String),
}

/// Handle a client connection
pub async fn handle_connection<S>(
    stream: S,
    engine: Arc<EngineContext>,
    format: OutputFormat,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::new(engine);
    let mut format = format;

    writer
        .write_all(format!("FragDB Server v{}\nReady for queries.\n", env!("CARGO_PKG_VERSION")).as_bytes())
        .await?;

    while let Some(line) = lines.next_line().await? {
        // Queries touch the filesystem and evaluate whole fragments
        let (returned, mode, reply) = tokio::task::spawn_blocking(move || {
            let reply = process_line(&mut session, &mut format, &line);
            (session, format, reply)
        })
        .await
        .map_err(|e| Error::Api(format!("query task failed: {}", e)))?;
        session = returned;
        format = mode;

        match reply {
            Some(Reply::Text(text)) => writer.write_all(text.as_bytes()).await?,
            Some(Reply::Close(text)) => {
                writer.write_all(text.as_bytes()).await?;
                break;
            }
            None => continue,
        }
        writer.flush().await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Execute one protocol line against a session
pub fn process_line(session: &mut Session, format: &mut OutputFormat, line: &str) -> Option<Reply> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if line.trim_start().starts_with('.') {
        return Some(dot_command(session, format, line.trim()));
    }

    let (query, arg_text) = match line.split_once('\t') {
        Some((q, a)) => (q, a),
        None => (line, ""),
    };

    let result = BinaryArg::parse_list(arg_text).and_then(|args| {
        debug!(query, args = args.len(), "executing query");
        session.execute(query, &args)
    });
    Some(Reply::Text(match result {
        Ok(result) => format_result(&result, *format),
        Err(e) => format_error(&e, *format),
    }))
}

fn dot_command(session: &Session, format: &mut OutputFormat, cmd: &str) -> Reply {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts.as_slice() {
        [".quit"] | [".exit"] => Reply::Close("Goodbye!\n".to_string()),
        [".mode", "json"] => {
            *format = OutputFormat::Json;
            Reply::Text("Output mode set to JSON\n".to_string())
        }
        [".mode", "table"] => {
            *format = OutputFormat::Table;
            Reply::Text("Output mode set to Table\n".to_string())
        }
        [".databases"] => Reply::Text(match session.engine().catalog().list_dbs() {
            Ok(dbs) if dbs.is_empty() => "No databases found.\n".to_string(),
            Ok(dbs) => format!(
                "Databases:\n{}\n",
                dbs.iter().map(|d| format!("  {}", d)).collect::<Vec<_>>().join("\n")
            ),
            Err(e) => format_error(&e, *format),
        }),
        [".fragments", db] => Reply::Text(match session.engine().catalog().find_db(db) {
            Ok(def) if def.fragments.is_empty() => format!("No fragments in '{}'.\n", db),
            Ok(def) => format!(
                "Fragments in '{}':\n{}\n",
                db,
                def.fragments
                    .iter()
                    .map(|f| format!("  {}", f))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            Err(e) => format_error(&e, *format),
        }),
        _ => Reply::Text(format!("Unknown command: {}\n", cmd)),
    }
}

/// Format an error for the client
pub fn format_error(err: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::json!({
                "status": "error",
                "kind": format!("{:?}", err.kind()),
                "message": err.to_string(),
            })
            .to_string()
                + "\n"
        }
        OutputFormat::Table => format!("Error [{:?}]: {}\n", err.kind(), err),
    }
}

/// Format query result for sending to client
pub fn format_result(result: &QueryResult, format: OutputFormat) -> String {
    if let Some(ref msg) = result.message {
        if format == OutputFormat::Json {
            return serde_json::json!({
                "status": "success",
                "message": msg,
                "affected_rows": result.affected_rows
            })
            .to_string()
                + "\n";
        }
        return format!("{}\n", msg);
    }

    if format == OutputFormat::Json {
        return match serde_json::to_string(result) {
            Ok(json) => json + "\n",
            Err(e) => format!(
                "{{\"status\":\"error\",\"message\":\"Serialization error: {}\"}}\n",
                e
            ),
        };
    }

    if result.columns.is_empty() {
        return "OK\n".to_string();
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &result.rows {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(value.to_string().len());
            }
        }
    }

    let separator = format!(
        "+{}+\n",
        widths
            .iter()
            .map(|w| "-".repeat(*w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut output = separator.clone();
    let header = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in &result.rows {
        let row_str = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", row_str));
    }
    if !result.rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", result.rows.len()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FragmentProducer, ProducerRequest};
    use crate::expr::Value;
    use crate::fragment::{FieldType, Fragment, Schema};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_server_config() {
        let config = ServerConfig::new()
            .host("0.0.0.0")
            .port(5500)
            .symtable_headroom(4);

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5500);
        assert_eq!(config.bind_address(), "0.0.0.0:5500");
        assert_eq!(config.build_engine().unwrap().headroom(), 4);
    }

    #[test]
    fn test_connection_url() {
        let url = ConnectionUrl::parse("fragdb://localhost:5432/var/fragdb").unwrap();
        assert_eq!(url.scheme, "fragdb");
        assert_eq!(url.host, "localhost");
        assert_eq!(url.port, Some(5432));
        assert_eq!(url.path, "var/fragdb");

        let url = ConnectionUrl::parse("fragdb://myhost").unwrap();
        assert_eq!(url.port, None);
        assert_eq!(url.to_server_config().port, DEFAULT_PORT);
        assert!(url.to_server_config().data_dir.is_none());

        assert!(ConnectionUrl::parse("localhost:7171").is_err());
        assert!(ConnectionUrl::parse("fragdb://host:notaport").is_err());
    }

    #[test]
    fn test_format_result() {
        let result = QueryResult {
            columns: vec!["id".to_string(), "v".to_string()],
            rows: vec![vec![Value::Long(2), Value::Double(40.0)]],
            affected_rows: 0,
            message: None,
        };
        let table = format_result(&result, OutputFormat::Table);
        assert!(table.contains("| id |"));
        assert!(table.contains("1 row(s) returned"));

        let json = format_result(&result, OutputFormat::Json);
        assert!(json.contains("\"columns\":[\"id\",\"v\"]"));

        let msg = format_result(&QueryResult::with_message("Database 'db' created"), OutputFormat::Table);
        assert_eq!(msg, "Database 'db' created\n");
    }

    #[test]
    fn test_process_line() {
        let mut session = Session::new(Arc::new(EngineContext::in_memory()));
        let mut format = OutputFormat::Table;

        assert_eq!(process_line(&mut session, &mut format, "   "), None);
        let reply = process_line(&mut session, &mut format, "operation=create_db;db_name=db");
        assert_eq!(reply, Some(Reply::Text("Database 'db' created\n".to_string())));

        let reply = process_line(&mut session, &mut format, "operation=nope");
        assert!(matches!(reply, Some(Reply::Text(t)) if t.starts_with("Error [Parse]")));

        process_line(&mut session, &mut format, ".mode json");
        assert_eq!(format, OutputFormat::Json);
        let reply = process_line(&mut session, &mut format, ".databases");
        assert_eq!(reply, Some(Reply::Text("Databases:\n  db\n".to_string())));
        assert!(matches!(
            process_line(&mut session, &mut format, ".quit"),
            Some(Reply::Close(_))
        ));
    }

    /// Producer that blocks until the test releases it
    struct Gate {
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl FragmentProducer for Gate {
        fn produce(&self, request: &ProducerRequest) -> Result<Fragment> {
            self.release
                .lock()
                .map_err(|_| Error::Api("gate poisoned".into()))?
                .recv()
                .map_err(|_| Error::Api("gate closed".into()))?;
            Ok(Fragment::new(
                request.measure.clone(),
                Schema::from_pairs([("id", FieldType::Long)]),
            ))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_query_does_not_stall_other_connections() {
        let (release, gate) = std::sync::mpsc::channel();
        let engine = Arc::new(EngineContext::in_memory().with_producer(
            "gate",
            Arc::new(Gate {
                release: std::sync::Mutex::new(gate),
            }),
        ));

        let (slow_client, slow_server) = tokio::io::duplex(4096);
        let slow = tokio::spawn(handle_connection(slow_server, Arc::clone(&engine), OutputFormat::Table));
        let (mut slow_rx, mut slow_tx) = tokio::io::split(slow_client);
        slow_tx.write_all(b"operation=create_db;db_name=db
").await.unwrap();
        slow_tx
            .write_all(b"operation=create_frag_from_file;frag_name=db.g;producer=gate;src_path=none;measure=m
")
            .await
            .unwrap();

        // Served while the import above is still parked in the producer
        let (fast_client, fast_server) = tokio::io::duplex(4096);
        let fast = tokio::spawn(handle_connection(fast_server, Arc::clone(&engine), OutputFormat::Table));
        let (mut fast_rx, mut fast_tx) = tokio::io::split(fast_client);
        fast_tx.write_all(b"operation=create_db;db_name=other
.quit
").await.unwrap();
        let mut output = String::new();
        fast_rx.read_to_string(&mut output).await.unwrap();
        fast.await.unwrap().unwrap();
        assert!(output.contains("Database 'other' created"));

        release.send(()).unwrap();
        slow_tx.write_all(b".quit\n").await.unwrap();
        let mut output = String::new();
        slow_rx.read_to_string(&mut output).await.unwrap();
        slow.await.unwrap().unwrap();
        assert!(output.contains("Fragment 'db.g' imported with 0 row(s)"));
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let (client, server) = tokio::io::duplex(4096);
        let engine = Arc::new(EngineContext::in_memory());
        let handle = tokio::spawn(handle_connection(server, engine, OutputFormat::Table));

        let (mut rx, mut tx) = tokio::io::split(client);
        tx.write_all(b"operation=create_db;db_name=db\n").await.unwrap();
        tx.write_all(b"operation=create_frag;frag_name=db.f;field=id|v;field_type=long|double\n")
            .await
            .unwrap();
        tx.write_all(b"operation=insert;value=1|?1\tdouble:2.5\n").await.unwrap();
        tx.write_all(b"operation=select;from=db.f;field=v\n").await.unwrap();
        tx.write_all(b".quit\n").await.unwrap();

        let mut output = String::new();
        rx.read_to_string(&mut output).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(output.starts_with("FragDB Server"));
        assert!(output.contains("Fragment 'db.f' stored with 1 row(s)"));
        assert!(output.contains("2.5"));
        assert!(output.ends_with("Goodbye!\n"));
    }
}
