//! `GameApi` over the world bridge: newline-delimited JSON on one TCP connection.
//!
//! Requests are `{"id", "op", ...args}`. The bridge answers each with
//! `{"id", "ok", "result"}` or `{"id", "ok": false, "error"}`, in any order, and interleaves
//! unsolicited `{"event": {...}}` lines carrying `WorldEvent`s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use craftbot_core::agent::game_api::{
    BlockSearch, BoxFuture, ContainerWindow, EquipSlot, Face, FurnaceSlot, GameApi, Goal,
    WorldEvent,
};
use craftbot_core::agent::observation::{
    BlockPos, BlockSummary, EntitySummary, ItemStack, SelfStatus, Vec3,
};
use craftbot_core::error::{WorldError, WorldResult};
use craftbot_core::world::data::DataTables;
use craftbot_core::world::recipe::Recipe;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Login parameters forwarded to the bridge.
#[derive(Debug, Clone)]
pub struct Login {
    pub username: String,
    pub host: String,
    pub port: u16,
    pub version: Option<String>,
}

pub struct BridgeGameApi {
    username: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    events: broadcast::Sender<WorldEvent>,
    reader: JoinHandle<()>,
}

impl BridgeGameApi {
    /// Connects to the bridge and logs the agent in.
    pub async fn connect(addr: &str, login: Login) -> anyhow::Result<Arc<Self>> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect world bridge {addr}"))?;
        let (read, write) = stream.into_split();
        let pending: Pending = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let reader = tokio::spawn(read_loop(
            BufReader::new(read),
            Arc::clone(&pending),
            Arc::clone(&closed),
            events.clone(),
        ));

        let api = Arc::new(Self {
            username: login.username.clone(),
            writer: tokio::sync::Mutex::new(write),
            pending,
            closed,
            next_id: AtomicU64::new(1),
            events,
            reader,
        });
        api.request::<()>(
            "login",
            json!({
                "username": login.username,
                "host": login.host,
                "port": login.port,
                "version": login.version,
            }),
        )
        .await
        .with_context(|| format!("login as {}", api.username))?;
        Ok(api)
    }

    /// Game data tables for the connected server version.
    pub async fn data_tables(&self) -> anyhow::Result<DataTables> {
        let value: Value = self
            .request("data", json!({}))
            .await
            .context("fetch data tables")?;
        DataTables::from_value(value)
    }

    async fn request<T: DeserializeOwned>(&self, op: &str, args: Value) -> WorldResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = encode_request(id, op, args)?;
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        // Checked after registering: the reader sets the flag before it clears `pending`.
        if self.closed.load(Ordering::SeqCst) {
            lock(&self.pending).remove(&id);
            return Err(WorldError::Disconnected);
        }

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(err) => Err(err),
            }
        };
        if let Err(err) = written {
            lock(&self.pending).remove(&id);
            debug!(op, "bridge.write_failed: {err}");
            return Err(WorldError::Disconnected);
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(WorldError::Disconnected),
            Err(_) => {
                lock(&self.pending).remove(&id);
                return Err(WorldError::Timeout("bridge response"));
            }
        };
        decode_response(op, response)
    }

    fn call<'a, T>(&'a self, op: &'static str, args: Value) -> BoxFuture<'a, WorldResult<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        Box::pin(self.request(op, args))
    }
}

impl Drop for BridgeGameApi {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
    pending.lock().unwrap_or_else(|p| p.into_inner())
}

fn encode_request(id: u64, op: &str, args: Value) -> WorldResult<String> {
    let mut body = match args {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(WorldError::Protocol(format!(
                "{op}: arguments must be an object, got {other}"
            )));
        }
    };
    body.insert("id".to_string(), json!(id));
    body.insert("op".to_string(), json!(op));
    Ok(format!("{}\n", Value::Object(body)))
}

fn decode_response<T: DeserializeOwned>(op: &str, response: Response) -> WorldResult<T> {
    if !response.ok {
        return Err(WorldError::Rejected(
            response.error.unwrap_or_else(|| format!("{op} failed")),
        ));
    }
    serde_json::from_value(response.result)
        .map_err(|err| WorldError::Protocol(format!("{op}: {err}")))
}

/// One inbound line: an event, or the response to request `id`.
#[derive(Debug)]
enum Inbound {
    Event(WorldEvent),
    Response(Response),
}

fn parse_line(line: &str) -> anyhow::Result<Inbound> {
    let mut value: Value = serde_json::from_str(line).context("invalid bridge json")?;
    if let Some(event) = value.get_mut("event") {
        let event = serde_json::from_value(event.take()).context("invalid bridge event")?;
        return Ok(Inbound::Event(event));
    }
    let response = serde_json::from_value(value).context("invalid bridge response")?;
    Ok(Inbound::Response(response))
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    events: broadcast::Sender<WorldEvent>,
) {
    let mut line = String::new();
    let reason = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break "bridge closed the connection".to_string(),
            Ok(_) => {}
            Err(err) => break format!("bridge read failed: {err}"),
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Ok(Inbound::Event(event)) => {
                let _ = events.send(event);
            }
            Ok(Inbound::Response(response)) => {
                let waiter = lock(&pending).remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(id = response.id, "bridge.unmatched_response"),
                }
            }
            Err(err) => warn!("bridge.bad_line: {err:#}"),
        }
    };

    // Dropping the senders fails every in-flight request with `Disconnected`.
    closed.store(true, Ordering::SeqCst);
    lock(&pending).clear();
    let _ = events.send(WorldEvent::End {
        reason: Some(reason),
    });
}

impl GameApi for BridgeGameApi {
    fn username(&self) -> &str {
        &self.username
    }

    fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    fn status<'a>(&'a self) -> BoxFuture<'a, WorldResult<SelfStatus>> {
        self.call("status", json!({}))
    }

    fn inventory<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<ItemStack>>> {
        self.call("inventory", json!({}))
    }

    fn entities<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<EntitySummary>>> {
        self.call("entities", json!({}))
    }

    fn blocks_in_box<'a>(
        &'a self,
        min: BlockPos,
        max: BlockPos,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>> {
        self.call("blocks_in_box", json!({ "min": min, "max": max }))
    }

    fn find_blocks<'a>(
        &'a self,
        search: BlockSearch,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>> {
        self.call("find_blocks", json!({ "search": search }))
    }

    fn set_goal<'a>(&'a self, goal: Goal) -> BoxFuture<'a, WorldResult<()>> {
        self.call("set_goal", json!({ "goal": goal }))
    }

    fn clear_goal<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        self.call("clear_goal", json!({}))
    }

    fn look_at<'a>(&'a self, pos: Vec3) -> BoxFuture<'a, WorldResult<()>> {
        self.call("look_at", json!({ "position": pos }))
    }

    fn dig<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        self.call("dig", json!({ "position": pos }))
    }

    fn place_block<'a>(
        &'a self,
        reference: BlockPos,
        face: Face,
    ) -> BoxFuture<'a, WorldResult<()>> {
        self.call("place_block", json!({ "reference": reference, "face": face }))
    }

    fn activate_block<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        self.call("activate_block", json!({ "position": pos }))
    }

    fn sleep_in<'a>(&'a self, bed: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        self.call("sleep", json!({ "position": bed }))
    }

    fn attack<'a>(&'a self, entity_id: u32) -> BoxFuture<'a, WorldResult<()>> {
        self.call("attack", json!({ "entity": entity_id }))
    }

    fn equip<'a>(&'a self, item_id: u32, slot: EquipSlot) -> BoxFuture<'a, WorldResult<()>> {
        self.call("equip", json!({ "item": item_id, "slot": slot }))
    }

    fn consume<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        self.call("consume", json!({}))
    }

    fn toss<'a>(&'a self, item_id: u32, count: u32) -> BoxFuture<'a, WorldResult<()>> {
        self.call("toss", json!({ "item": item_id, "count": count }))
    }

    fn open_container<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>> {
        self.call("open_container", json!({ "position": pos }))
    }

    fn deposit<'a>(
        &'a self,
        window: u32,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        self.call("deposit", json!({ "window": window, "item": item_id, "count": count }))
    }

    fn withdraw<'a>(
        &'a self,
        window: u32,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        self.call("withdraw", json!({ "window": window, "item": item_id, "count": count }))
    }

    fn close_container<'a>(&'a self, window: u32) -> BoxFuture<'a, WorldResult<()>> {
        self.call("close_window", json!({ "window": window }))
    }

    fn open_furnace<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>> {
        self.call("open_furnace", json!({ "position": pos }))
    }

    fn furnace_put<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        self.call(
            "furnace_put",
            json!({ "window": window, "slot": slot, "item": item_id, "count": count }),
        )
    }

    fn furnace_take<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
    ) -> BoxFuture<'a, WorldResult<Option<ItemStack>>> {
        self.call("furnace_take", json!({ "window": window, "slot": slot }))
    }

    fn craft<'a>(
        &'a self,
        recipe: Recipe,
        count: u32,
        table: Option<BlockPos>,
    ) -> BoxFuture<'a, WorldResult<()>> {
        self.call(
            "craft",
            json!({ "recipe": recipe.raw, "count": count, "table": table }),
        )
    }

    fn chat<'a>(&'a self, text: String) -> BoxFuture<'a, WorldResult<()>> {
        self.call("chat", json!({ "text": text }))
    }

    fn whisper<'a>(&'a self, username: String, text: String) -> BoxFuture<'a, WorldResult<()>> {
        self.call("whisper", json!({ "username": username, "text": text }))
    }

    fn quit<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        self.call("quit", json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn requests_carry_id_and_op() {
        let line = encode_request(7, "toss", json!({ "item": 4, "count": 2 })).unwrap();
        assert!(line.ends_with('\n'));
        let v: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["op"], "toss");
        assert_eq!(v["count"], 2);
        assert!(encode_request(1, "toss", json!([1, 2])).is_err());
    }

    #[test]
    fn failed_responses_become_rejections() {
        let response = Response {
            id: 1,
            ok: false,
            result: Value::Null,
            error: Some("cannot reach block".to_string()),
        };
        let err = decode_response::<()>("dig", response).unwrap_err();
        assert_eq!(err, WorldError::Rejected("cannot reach block".to_string()));

        let response = Response { id: 2, ok: true, result: json!("x"), error: None };
        assert!(matches!(
            decode_response::<u32>("status", response),
            Err(WorldError::Protocol(_))
        ));
    }

    #[test]
    fn event_lines_are_told_apart_from_responses() {
        match parse_line(r#"{"event": {"type": "whisper", "username": "Alex", "message": "hi"}}"#) {
            Ok(Inbound::Event(WorldEvent::Whisper { username, message })) => {
                assert_eq!(username, "Alex");
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_line(r#"{"id": 3, "ok": true, "result": null}"#),
            Ok(Inbound::Response(Response { id: 3, ok: true, .. }))
        ));
    }

    #[tokio::test]
    async fn round_trip_against_a_scripted_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Some(line) = lines.next_line().await.unwrap() {
                let req: Value = serde_json::from_str(&line).unwrap();
                let reply = match req["op"].as_str() {
                    Some("inventory") => json!({
                        "id": req["id"],
                        "ok": true,
                        "result": [{"id": 297, "name": "bread", "count": 3}],
                    }),
                    Some("dig") => json!({ "id": req["id"], "ok": false, "error": "too far" }),
                    _ => json!({ "id": req["id"], "ok": true, "result": null }),
                };
                write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
                if req["op"] == "quit" {
                    break;
                }
            }
        });

        let api = BridgeGameApi::connect(
            &addr,
            Login {
                username: "Andy".to_string(),
                host: "localhost".to_string(),
                port: 25565,
                version: None,
            },
        )
        .await
        .unwrap();
        let mut events = api.subscribe();

        let items = api.inventory().await.unwrap();
        assert_eq!(items[0].name, "bread");
        assert_eq!(
            api.dig(BlockPos::new(0, 63, 0)).await,
            Err(WorldError::Rejected("too far".to_string()))
        );
        api.quit().await.unwrap();
        server.await.unwrap();

        assert!(matches!(events.recv().await, Ok(WorldEvent::End { .. })));
        assert_eq!(api.status().await, Err(WorldError::Disconnected));
    }
}
