//! Connection lifecycle callbacks.

use std::sync::Arc;

use http::request::Parts;

use crate::client::Client;

type EnterHook = Arc<dyn Fn(&Arc<Client>, &Parts) + Send + Sync>;
type ClientHook = Arc<dyn Fn(&Arc<Client>) + Send + Sync>;

/// Optional callbacks fired at lifecycle points of every connection.
///
/// Hooks run on the connection's own tasks and should return quickly.
/// `on_leave` fires at most once per connection, and is skipped when the
/// application ended the connection itself with [`Client::shutdown`].
#[derive(Clone, Default)]
pub struct Hooks {
    enter: Option<EnterHook>,
    leave: Option<ClientHook>,
    ping: Option<ClientHook>,
}

impl Hooks {
    /// Create an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired once after the client is registered, before any message is read.
    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>, &Parts) + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(hook));
        self
    }

    /// Fired once after the connection has ended.
    pub fn on_leave<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.leave = Some(Arc::new(hook));
        self
    }

    /// Fired after each keep-alive ping is written.
    pub fn on_ping<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Client>) + Send + Sync + 'static,
    {
        self.ping = Some(Arc::new(hook));
        self
    }

    pub(crate) fn fire_enter(&self, client: &Arc<Client>, parts: &Parts) {
        if let Some(hook) = &self.enter {
            hook(client, parts);
        }
    }

    pub(crate) fn fire_leave(&self, client: &Arc<Client>) {
        if let Some(hook) = &self.leave {
            hook(client);
        }
    }

    pub(crate) fn fire_ping(&self, client: &Arc<Client>) {
        if let Some(hook) = &self.ping {
            hook(client);
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_enter", &self.enter.is_some())
            .field("on_leave", &self.leave.is_some())
            .field("on_ping", &self.ping.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fire_registered_hooks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        let c2 = Arc::clone(&count);
        let hooks = Hooks::new()
            .on_leave(move |_| {
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .on_ping(move |_| {
                c2.fetch_add(10, Ordering::SeqCst);
            });

        let (client, _channels) = Client::new("abcdefghijABCDEFGHIJ", 1);
        let (parts, ()) = http::Request::new(()).into_parts();
        hooks.fire_enter(&client, &parts);
        hooks.fire_leave(&client);
        hooks.fire_ping(&client);

        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_debug() {
        let hooks = Hooks::new().on_enter(|_, _| {});
        assert_eq!(
            format!("{:?}", hooks),
            "Hooks { on_enter: true, on_leave: false, on_ping: false }"
        );
    }
}
