//! # Services and clients (callback and dispatch contract only).
//!
//! Services register by name in a [`ServiceDirectory`] owned by the context.
//! A request travels as follows:
//!
//! ```text
//! client.async_send_request(req, cb)
//!   ├─ directory.lookup(name) ─► None ─► Err(ServiceUnavailable)
//!   ├─ store cb under seq
//!   └─ service.enqueue(seq, req, Weak<client>) ─► service wake
//!
//! service.execute()
//!   └─ pop (seq, req) ─► handler(req) ─► client.deliver(seq, res) ─► client wake
//!
//! client.execute()
//!   └─ pop (seq, res) ─► take cb[seq] ─► cb(res)
//! ```
//!
//! A client that is destroyed before its response arrives is skipped silently.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crate::error::ExecutorError;

use super::executable::{ClientBase, Executable, ServiceBase};
use super::wake::{EntityKey, EntityKind, WakeSlot};

type Handler<Req, Res> = Box<dyn Fn(Req) -> Res + Send + Sync>;
type ResponseCallback<Res> = Box<dyn FnOnce(Res) + Send>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Name-keyed registry of live services.
#[derive(Default)]
pub struct ServiceDirectory {
    entries: RwLock<HashMap<String, Weak<dyn Any + Send + Sync>>>,
}

impl ServiceDirectory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, name: &str, service: Weak<dyn Any + Send + Sync>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, w| w.strong_count() > 0);
        entries.insert(name.to_string(), service);
    }

    /// Live service of the given request/response types registered under `name`.
    fn lookup<Req, Res>(&self, name: &str) -> Option<Arc<Service<Req, Res>>>
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .and_then(Weak::upgrade)
            .and_then(|any| any.downcast::<Service<Req, Res>>().ok())
    }
}

struct Request<Req, Res> {
    seq: u64,
    payload: Req,
    client: Weak<Client<Req, Res>>,
}

/// Request/response server.
pub struct Service<Req, Res> {
    key: EntityKey,
    name: String,
    handler: Handler<Req, Res>,
    requests: Mutex<VecDeque<Request<Req, Res>>>,
    slot: WakeSlot,
}

impl<Req, Res> Service<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new<F>(name: &str, handler: F, directory: &ServiceDirectory) -> Arc<Self>
    where
        F: Fn(Req) -> Res + Send + Sync + 'static,
    {
        let service = Arc::new(Self {
            key: EntityKey::next(),
            name: name.to_string(),
            handler: Box::new(handler),
            requests: Mutex::new(VecDeque::new()),
            slot: WakeSlot::new(),
        });
        let any: Arc<dyn Any + Send + Sync> = service.clone();
        directory.register(name, Arc::downgrade(&any));
        service
    }

    fn enqueue(&self, request: Request<Req, Res>) {
        lock(&self.requests).push_back(request);
        self.notify_ready();
    }

    /// Requests waiting to be served.
    pub fn pending_requests(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl<Req, Res> Executable for Service<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Service
    }

    fn wake_slot(&self) -> &WakeSlot {
        &self.slot
    }

    fn pending_work(&self) -> usize {
        lock(&self.requests).len()
    }

    fn execute(&self) {
        let Some(request) = lock(&self.requests).pop_front() else {
            return;
        };
        let response = (self.handler)(request.payload);
        if let Some(client) = request.client.upgrade() {
            client.deliver(request.seq, response);
        }
    }
}

impl<Req, Res> ServiceBase for Service<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn service_name(&self) -> &str {
        &self.name
    }
}

impl<Req, Res> fmt::Debug for Service<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish()
    }
}

/// Request/response caller.
pub struct Client<Req, Res> {
    key: EntityKey,
    name: String,
    directory: Arc<ServiceDirectory>,
    me: Weak<Self>,
    seq: AtomicU64,
    _req: PhantomData<fn(Req)>,
    callbacks: Mutex<HashMap<u64, ResponseCallback<Res>>>,
    responses: Mutex<VecDeque<(u64, Res)>>,
    slot: WakeSlot,
}

impl<Req, Res> Client<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new(name: &str, directory: Arc<ServiceDirectory>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            key: EntityKey::next(),
            name: name.to_string(),
            directory,
            me: me.clone(),
            seq: AtomicU64::new(1),
            _req: PhantomData,
            callbacks: Mutex::new(HashMap::new()),
            responses: Mutex::new(VecDeque::new()),
            slot: WakeSlot::new(),
        })
    }

    /// True if a live service is registered under this client's name.
    pub fn service_is_ready(&self) -> bool {
        self.directory.lookup::<Req, Res>(&self.name).is_some()
    }

    /// Sends `request`; `callback` runs on the executor when the response arrives.
    ///
    /// Returns the sequence number of the request, or
    /// [`ExecutorError::ServiceUnavailable`] if no service is live.
    pub fn async_send_request<F>(&self, request: Req, callback: F) -> Result<u64, ExecutorError>
    where
        F: FnOnce(Res) + Send + 'static,
    {
        let service = self
            .directory
            .lookup::<Req, Res>(&self.name)
            .ok_or_else(|| ExecutorError::ServiceUnavailable {
                service: self.name.clone(),
            })?;

        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        lock(&self.callbacks).insert(seq, Box::new(callback));
        service.enqueue(Request {
            seq,
            payload: request,
            client: self.me.clone(),
        });
        Ok(seq)
    }

    fn deliver(&self, seq: u64, response: Res) {
        lock(&self.responses).push_back((seq, response));
        self.notify_ready();
    }
}

impl<Req, Res> Executable for Client<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Client
    }

    fn wake_slot(&self) -> &WakeSlot {
        &self.slot
    }

    fn pending_work(&self) -> usize {
        lock(&self.responses).len()
    }

    fn execute(&self) {
        let Some((seq, response)) = lock(&self.responses).pop_front() else {
            return;
        };
        let callback = lock(&self.callbacks).remove(&seq);
        match callback {
            Some(cb) => cb(response),
            None => tracing::debug!(client = %self.name, seq, "response without pending request"),
        }
    }
}

impl<Req, Res> ClientBase for Client<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn service_name(&self) -> &str {
        &self.name
    }

    fn pending_requests(&self) -> usize {
        lock(&self.callbacks).len()
    }
}

impl<Req, Res> fmt::Debug for Client<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("key", &self.key)
            .field("service", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ReadyEvent;

    #[test]
    fn request_round_trip_through_execute() {
        let directory = ServiceDirectory::new();
        let service = Service::new("add", |(a, b): (i32, i32)| a + b, &directory);
        let client = Client::<(i32, i32), i32>::new("add", directory.clone());
        assert!(client.service_is_ready());

        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        let seq = client
            .async_send_request((2, 3), move |sum| *g.lock().unwrap() = Some(sum))
            .unwrap();
        assert_eq!(seq, 1);
        assert_eq!(service.pending_requests(), 1);
        assert_eq!(client.pending_requests(), 1);

        service.execute();
        client.execute();
        assert_eq!(*got.lock().unwrap(), Some(5));
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn missing_service_is_reported() {
        let directory = ServiceDirectory::new();
        let client = Client::<u8, u8>::new("nobody", directory.clone());
        assert!(!client.service_is_ready());
        let err = client.async_send_request(1, |_| {}).unwrap_err();
        assert_eq!(
            err,
            ExecutorError::ServiceUnavailable {
                service: "nobody".into()
            }
        );

        let service = Service::new("nobody", |x: u8| x, &directory);
        assert!(client.service_is_ready());
        drop(service);
        assert!(!client.service_is_ready());
    }

    #[test]
    fn mismatched_types_are_unavailable() {
        let directory = ServiceDirectory::new();
        let _service = Service::new("echo", |s: String| s, &directory);
        let client = Client::<u32, u32>::new("echo", directory.clone());
        assert!(!client.service_is_ready());
    }

    #[test]
    fn work_queued_before_wiring_is_signaled_on_install() {
        let directory = ServiceDirectory::new();
        let service = Service::new("echo", |x: u32| x, &directory);
        let client = Client::<u32, u32>::new("echo", directory.clone());
        client.async_send_request(1, |_| {}).unwrap();
        client.async_send_request(2, |_| {}).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        service.set_wake_callback(Arc::new(move |ev: ReadyEvent| s.lock().unwrap().push(ev.key)));
        assert_eq!(seen.lock().unwrap().as_slice(), &[service.key(), service.key()]);

        service.execute();
        let s = seen.clone();
        client.set_wake_callback(Arc::new(move |ev: ReadyEvent| s.lock().unwrap().push(ev.key)));
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(seen.lock().unwrap()[2], client.key());

        // Reinstalling on a wired entity replays nothing.
        let s = seen.clone();
        client.set_wake_callback(Arc::new(move |ev: ReadyEvent| s.lock().unwrap().push(ev.key)));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}
