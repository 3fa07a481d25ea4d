use byteorder::{BigEndian, WriteBytesExt};
use crowdstore::storage::{Config, JsonFileStorage};
use crowdstore::{Datum, Engine, Record};
use rmpv::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Helper function to generate unique ids with timestamp
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let random_suffix = fastrand::u32(1000..9999);
    format!("{prefix}_{timestamp}{random_suffix}")
}

/// A scratch directory and the store file path inside it
#[allow(dead_code)]
pub fn scratch_store() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("database.json");
    (dir, path)
}

#[allow(dead_code)]
pub fn file_storage(path: &Path) -> JsonFileStorage {
    JsonFileStorage::open(&Config {
        data_file: path.to_path_buf(),
        pretty: true,
    })
}

#[allow(dead_code)]
pub fn open_engine(path: &Path) -> Engine {
    Engine::open(file_storage(path)).expect("Failed to open store")
}

#[allow(dead_code)]
pub fn field<'r>(record: &'r Record, name: &str) -> &'r Datum {
    record
        .get(name)
        .unwrap_or_else(|| panic!("record has no field {name}: {record:?}"))
}

#[allow(dead_code)]
pub fn ids(rows: &[Record]) -> Vec<String> {
    rows.iter()
        .map(|r| field(r, "id").as_str().unwrap_or_default().to_string())
        .collect()
}

/// Binds a server on an ephemeral port and returns its address
#[allow(dead_code)]
pub async fn spawn_server(engine: Engine) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().unwrap();
    let engine = Arc::new(Mutex::new(engine));
    tokio::spawn(async move {
        let _ = crowdstore::server::serve(listener, engine).await;
    });
    addr
}

/// Build a request map for the server
#[allow(dead_code)]
pub fn request(statement: &str, mode: &str, params: Vec<Value>) -> Value {
    Value::Map(vec![
        (Value::from("statement"), Value::from(statement)),
        (Value::from("mode"), Value::from(mode)),
        (Value::from("params"), Value::Array(params)),
    ])
}

/// Helper function to send a request frame and read the response frame
#[allow(dead_code)]
pub async fn send_request(
    stream: &mut TcpStream,
    request: &Value,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, request)?;

    let mut frame = Vec::new();
    WriteBytesExt::write_u32::<BigEndian>(&mut frame, u32::try_from(payload.len())?)?;
    frame.extend(payload);
    stream.write_all(&frame).await?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await?;

    Ok(rmpv::decode::read_value(&mut &buffer[..])?)
}

/// Look up a key in a msgpack map
#[allow(dead_code)]
pub fn lookup<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}
