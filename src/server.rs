use crate::ast::{Datum, Record};
use crate::engine::{Engine, Mode, Output};
use crate::evaluator::EvalStats;
use byteorder::{BigEndian, WriteBytesExt};
use rmpv::Value;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Upper bound on a single request frame.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A statement to execute, as sent by clients.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub statement: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub params: Vec<Datum>,
}

pub async fn start_server(engine: Arc<Mutex<Engine>>, address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    log::info!("crowdstore server listening on {}", listener.local_addr()?);
    serve(listener, engine).await
}

/// Accepts connections on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, engine: Arc<Mutex<Engine>>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(engine, stream).await {
                log::error!("Client error: {e}");
            }
        });
    }
}

async fn handle_client(engine: Arc<Mutex<Engine>>, stream: TcpStream) -> anyhow::Result<()> {
    let peer = stream.peer_addr()?;
    log::debug!("Accepted connection from {peer}");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let msg_len = u32::from_be_bytes(len_buf) as usize;
        if msg_len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {msg_len} bytes from {peer} exceeds limit");
        }

        let mut buffer = vec![0u8; msg_len];
        if reader.read_exact(&mut buffer).await.is_err() {
            break;
        }

        let response = process_request(&engine, &buffer)
            .await
            .unwrap_or_else(|err| {
                log::warn!("Failed to process request from {peer}: {err}");
                Value::Map(vec![(Value::from("error"), Value::from(err.to_string()))])
            });

        let mut payload = Vec::new();
        rmpv::encode::write_value(&mut payload, &response)?;

        let mut out: Vec<u8> = Vec::new();
        WriteBytesExt::write_u32::<BigEndian>(&mut out, u32::try_from(payload.len())?)?;
        out.extend(payload);

        write_half.write_all(&out).await?;
    }

    log::debug!("Connection from {peer} closed");
    Ok(())
}

async fn process_request(engine: &Mutex<Engine>, frame: &[u8]) -> anyhow::Result<Value> {
    let request: Request = rmp_serde::from_slice(frame)?;
    log::debug!("{:?}: {}", request.mode, request.statement);

    let mut engine = engine.lock().await;
    let (output, stats) = engine.dispatch(request.mode, &request.statement, &request.params)?;
    drop(engine);

    Ok(Value::Map(vec![
        (Value::from("result"), output_to_rmpv(output)),
        (Value::from("stats"), stats_to_rmpv(&stats)),
    ]))
}

fn stats_to_rmpv(stats: &EvalStats) -> Value {
    let count = |n: usize| Value::from(u64::try_from(n).unwrap_or(u64::MAX));
    Value::Map(vec![
        (Value::from("rows_scanned"), count(stats.rows_scanned)),
        (Value::from("inserted_count"), count(stats.inserted_count)),
        (Value::from("updated_count"), count(stats.updated_count)),
        (Value::from("deleted_count"), count(stats.deleted_count)),
        (Value::from("returned_count"), count(stats.returned_count)),
        (
            Value::from("duration_ms"),
            Value::from(u64::try_from(stats.duration_ms).unwrap_or(u64::MAX)),
        ),
    ])
}

fn output_to_rmpv(output: Output) -> Value {
    match output {
        Output::Rows(rows) => Value::Array(rows.into_iter().map(record_to_rmpv).collect()),
        Output::Row(row) => row.map_or(Value::Nil, record_to_rmpv),
        Output::Affected(n) => Value::from(u64::try_from(n).unwrap_or(u64::MAX)),
    }
}

fn record_to_rmpv(record: Record) -> Value {
    Value::Map(
        record
            .into_iter()
            .map(|(k, v)| (Value::String(k.into()), datum_to_rmpv(v)))
            .collect(),
    )
}

fn datum_to_rmpv(datum: Datum) -> Value {
    match datum {
        Datum::String(s) => Value::String(s.into()),
        Datum::Integer(i) => Value::Integer(i.into()),
        Datum::Decimal(d) => d
            .to_f64()
            .map_or_else(|| Value::String(d.to_string().into()), Value::F64),
        Datum::Bool(b) => Value::Boolean(b),
        Datum::Null => Value::Nil,
    }
}
