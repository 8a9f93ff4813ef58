use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::codec::nul_terminated;
use crate::codec::split_nul_terminated;
use crate::codec::Message;
use crate::codec::MessageHeader;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::utils::async_task::spawn_task;
use crate::LoopbackChannel;
use crate::NodePermission;
use crate::ProtocolError;
use crate::Result;
use crate::RingPage;
use crate::RingTransport;
use crate::Side;
use crate::Xenbus;
use crate::XenbusConfig;

type Tree = BTreeMap<String, Vec<u8>>;

/// Store daemon double. Serves the request ring of a [`RingPage`] from an
/// in-memory path tree, with transactions, permissions and watches.
///
/// - Acknowledgements carry an empty payload.
/// - A watch fires for the changed path and every path below the watched
///   one; registering a watch fires nothing.
/// - A commit conflicts (`EAGAIN`) when anything else committed since the
///   transaction began, or when a conflict was injected.
pub struct MockStore {
    inner: Arc<StoreInner>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct StoreInner {
    transport: Arc<RingTransport>,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    nodes: Tree,
    perms: HashMap<String, Vec<String>>,
    watches: Vec<(String, String)>,
    transactions: HashMap<u32, PendingTxn>,
    next_txn: u32,
    generation: u64,
    injected_conflicts: usize,
    silent: bool,
    held: Vec<Message>,
    debug_log: Vec<String>,
    received: Vec<MessageHeader>,
}

struct PendingTxn {
    nodes: Tree,
    base_generation: u64,
    changed: Vec<String>,
}

type Reply = std::result::Result<Vec<u8>, &'static str>;

impl MockStore {
    /// Starts serving `page` with `channel` as the store end of the event
    /// channel.
    pub fn start(
        page: Arc<RingPage>,
        channel: Arc<LoopbackChannel>,
    ) -> Result<Self> {
        let transport = Arc::new(RingTransport::new(page, channel, Side::Store));
        transport.bind()?;
        let inner = Arc::new(StoreInner {
            transport,
            state: Mutex::new(StoreState {
                next_txn: 1,
                ..Default::default()
            }),
        });
        let shutdown = CancellationToken::new();

        let task = {
            let inner = inner.clone();
            let shutdown = shutdown.clone();
            spawn_task("mock-store", move || inner.serve(shutdown))
        };

        Ok(Self {
            inner,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Sets a node directly. Fires no watches.
    pub fn set(
        &self,
        path: &str,
        value: impl AsRef<[u8]>,
    ) {
        let mut state = self.inner.state.lock();
        insert_with_parents(&mut state.nodes, path, value.as_ref());
    }

    pub fn get(
        &self,
        path: &str,
    ) -> Option<Vec<u8>> {
        self.inner.state.lock().nodes.get(path).cloned()
    }

    /// Commits a change made by another domain, firing matching watches.
    pub async fn change(
        &self,
        path: &str,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        let events = {
            let mut state = self.inner.state.lock();
            insert_with_parents(&mut state.nodes, path, value.as_ref());
            state.generation += 1;
            state.watch_events(&[path.to_string()])
        };
        for event in &events {
            self.inner.transport.write(event).await?;
        }
        Ok(())
    }

    /// The next `n` commits fail with `EAGAIN`.
    pub fn inject_conflicts(
        &self,
        n: usize,
    ) {
        self.inner.state.lock().injected_conflicts = n;
    }

    /// While silent, requests are consumed and recorded but held back
    /// unanswered until [`MockStore::answer_held`].
    pub fn set_silent(
        &self,
        silent: bool,
    ) {
        self.inner.state.lock().silent = silent;
    }

    /// Serves every held request, in arrival order.
    pub async fn answer_held(&self) -> Result<()> {
        let held = std::mem::take(&mut self.inner.state.lock().held);
        for request in held {
            for msg in self.inner.answer(request) {
                self.inner.transport.write(&msg).await?;
            }
        }
        Ok(())
    }

    pub fn debug_messages(&self) -> Vec<String> {
        self.inner.state.lock().debug_log.clone()
    }

    /// Headers of every request served so far, in arrival order.
    pub fn received(&self) -> Vec<MessageHeader> {
        self.inner.state.lock().received.clone()
    }

    pub fn watch_count(&self) -> usize {
        self.inner.state.lock().watches.len()
    }

    pub fn open_transactions(&self) -> usize {
        self.inner.state.lock().transactions.len()
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Page, channel pair, a started [`MockStore`] and a [`Xenbus`] connected
/// to it.
pub async fn connect(config: XenbusConfig) -> (Xenbus, MockStore) {
    let page = Arc::new(RingPage::new());
    let (guest_end, store_end) = LoopbackChannel::pair();
    let store = MockStore::start(page.clone(), store_end).expect("store starts");
    let bus = Xenbus::start(page, guest_end, config)
        .await
        .expect("xenbus starts");
    (bus, store)
}

impl StoreInner {
    async fn serve(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let mut consumed = false;
            loop {
                let request = match self.transport.read() {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(e @ (ProtocolError::OversizedPayload { .. } | ProtocolError::CursorOverrun { .. })) => {
                        warn!(%e, "mock store dropping unreadable requests");
                        self.transport.discard_inbound();
                        consumed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(%e, "mock store dropping malformed request");
                        consumed = true;
                        continue;
                    }
                };
                consumed = true;
                for msg in self.handle(request) {
                    self.transport.write(&msg).await?;
                }
            }
            if consumed {
                self.transport.notify_peer()?;
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.transport.wait_inbound() => {}
            }
        }
    }

    /// Reply followed by any watch events the request caused.
    fn handle(
        &self,
        request: Message,
    ) -> Vec<Message> {
        {
            let mut state = self.state.lock();
            state.received.push(request.header);
            if state.silent {
                state.held.push(request);
                return Vec::new();
            }
        }
        self.answer(request)
    }

    fn answer(
        &self,
        request: Message,
    ) -> Vec<Message> {
        let mut state = self.state.lock();
        let header = request.header;
        let mut changed = Vec::new();
        let reply = state.apply(&request, &mut changed);
        debug!(msg_type = %header.msg_type, req_id = header.req_id, ok = reply.is_ok(), "mock store served request");

        let mut out = vec![match reply {
            Ok(payload) => Message::new(header.msg_type, header.req_id, header.tx_id, payload),
            Err(code) => Message::new(MessageType::Error, header.req_id, header.tx_id, nul_terminated(code)),
        }];
        out.extend(state.watch_events(&changed));
        out
    }
}

impl StoreState {
    fn apply(
        &mut self,
        request: &Message,
        changed: &mut Vec<String>,
    ) -> Reply {
        let txn = request.header.tx_id;
        let args = split_nul_terminated(&request.payload).map_err(|_| "EINVAL")?;
        let arg = |i: usize| args.get(i).map(String::as_str).ok_or("EINVAL");

        match request.msg_type() {
            MessageType::Read => {
                let path = arg(0)?;
                self.tree(txn)?.get(path).cloned().ok_or("ENOENT")
            }
            MessageType::Write => {
                let (path, value) = split_write(&request.payload)?;
                let tree = self.tree(txn)?;
                insert_with_parents(tree, &path, value);
                self.record_change(txn, path, changed);
                Ok(Vec::new())
            }
            MessageType::Directory => {
                let path = arg(0)?;
                let children = list_children(self.tree(txn)?, path).ok_or("ENOENT")?;
                Ok(children.iter().flat_map(|c| nul_terminated(c)).collect())
            }
            MessageType::Rm => {
                let path = arg(0)?.to_string();
                let tree = self.tree(txn)?;
                if !tree.contains_key(&path) {
                    return Err("ENOENT");
                }
                let below = format!("{path}/");
                tree.retain(|k, _| k != &path && !k.starts_with(&below));
                self.record_change(txn, path, changed);
                Ok(Vec::new())
            }
            MessageType::GetPerms => {
                let path = arg(0)?;
                if !self.tree(txn)?.contains_key(path) {
                    return Err("ENOENT");
                }
                let perms = self.perms.get(path).cloned().unwrap_or_else(|| vec!["n0".to_string()]);
                Ok(perms.iter().flat_map(|p| nul_terminated(p)).collect())
            }
            MessageType::SetPerms => {
                let path = arg(0)?.to_string();
                if !self.tree(txn)?.contains_key(&path) {
                    return Err("ENOENT");
                }
                let entries = args[1..].to_vec();
                if entries.is_empty() || entries.iter().any(|e| e.parse::<NodePermission>().is_err()) {
                    return Err("EINVAL");
                }
                self.perms.insert(path, entries);
                Ok(Vec::new())
            }
            MessageType::Watch => {
                let watch = (arg(0)?.to_string(), arg(1)?.to_string());
                if self.watches.contains(&watch) {
                    return Err("EEXIST");
                }
                self.watches.push(watch);
                Ok(Vec::new())
            }
            MessageType::Unwatch => {
                let watch = (arg(0)?.to_string(), arg(1)?.to_string());
                let pos = self.watches.iter().position(|w| *w == watch).ok_or("ENOENT")?;
                self.watches.remove(pos);
                Ok(Vec::new())
            }
            MessageType::TransactionStart => {
                let id = self.next_txn;
                self.next_txn += 1;
                self.transactions.insert(id, PendingTxn {
                    nodes: self.nodes.clone(),
                    base_generation: self.generation,
                    changed: Vec::new(),
                });
                Ok(nul_terminated(&id.to_string()))
            }
            MessageType::TransactionEnd => {
                let pending = self.transactions.remove(&txn.0).ok_or("ENOENT")?;
                if arg(0)? != "T" {
                    return Ok(Vec::new());
                }
                if self.injected_conflicts > 0 {
                    self.injected_conflicts -= 1;
                    return Err("EAGAIN");
                }
                if pending.base_generation != self.generation {
                    return Err("EAGAIN");
                }
                self.nodes = pending.nodes;
                if !pending.changed.is_empty() {
                    self.generation += 1;
                }
                changed.extend(pending.changed);
                Ok(Vec::new())
            }
            MessageType::Debug => {
                if arg(0)? == "print" {
                    self.debug_log.push(arg(1)?.to_string());
                }
                Ok(Vec::new())
            }
            _ => Err("ENOSYS"),
        }
    }

    fn tree(
        &mut self,
        txn: TransactionId,
    ) -> std::result::Result<&mut Tree, &'static str> {
        if txn.is_nil() {
            return Ok(&mut self.nodes);
        }
        self.transactions
            .get_mut(&txn.0)
            .map(|t| &mut t.nodes)
            .ok_or("ENOENT")
    }

    /// Changes outside a transaction are visible at once; inside one they
    /// wait for the commit.
    fn record_change(
        &mut self,
        txn: TransactionId,
        path: String,
        changed: &mut Vec<String>,
    ) {
        if !txn.is_nil() {
            if let Some(pending) = self.transactions.get_mut(&txn.0) {
                pending.changed.push(path);
                return;
            }
        }
        self.generation += 1;
        changed.push(path);
    }

    fn watch_events(
        &self,
        changed: &[String],
    ) -> Vec<Message> {
        let mut events = Vec::new();
        for path in changed {
            for (watched, token) in &self.watches {
                if path == watched || path.starts_with(&format!("{watched}/")) {
                    let payload = [nul_terminated(path), nul_terminated(token)].concat();
                    events.push(Message::new(MessageType::WatchEvent, 0, TransactionId::NIL, payload));
                }
            }
        }
        events
    }
}

fn split_write(payload: &[u8]) -> std::result::Result<(String, &[u8]), &'static str> {
    let nul = payload.iter().position(|b| *b == 0).ok_or("EINVAL")?;
    let path = std::str::from_utf8(&payload[..nul]).map_err(|_| "EINVAL")?;
    Ok((path.to_string(), &payload[nul + 1..]))
}

fn insert_with_parents(
    tree: &mut Tree,
    path: &str,
    value: &[u8],
) {
    let mut end = 0;
    while let Some(pos) = path[end..].find('/') {
        let parent = &path[..end + pos];
        if !parent.is_empty() {
            tree.entry(parent.to_string()).or_default();
        }
        end += pos + 1;
    }
    tree.insert(path.to_string(), value.to_vec());
}

fn list_children(
    tree: &Tree,
    path: &str,
) -> Option<Vec<String>> {
    let prefix = format!("{path}/");
    let mut children: Vec<String> = Vec::new();
    for key in tree.keys().filter(|k| k.starts_with(&prefix)) {
        let name = key[prefix.len()..].split('/').next().unwrap_or_default();
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
    if children.is_empty() && !tree.contains_key(path) {
        return None;
    }
    Some(children)
}
