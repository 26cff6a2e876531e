mod actions;
mod api;
mod core;
mod logging;
mod model;
mod push;
mod state;
mod updates;
mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use crate::core::{SharedChatApiOverride, SharedPushTransport};
use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use api::{
    ApiError, ChatApi, CreateMessageRequest, HttpChatApi, OutgoingAttachment, SharedChatApi,
};
pub use model::*;
pub use push::{
    inbound, outbound, PushConnectionEvent, PushDecodeError, PushEvent, PushTransport,
};
pub use state::*;
pub use updates::*;

/// Return the default `socio_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

#[uniffi::export]
pub fn is_provisional_message_id(id: &str) -> bool {
    model::is_provisional_id(id)
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    chat_api_override: SharedChatApiOverride,
    push_transport: SharedPushTransport,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let chat_api_override: SharedChatApiOverride = Arc::new(RwLock::new(None));
        let push_transport: SharedPushTransport = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let api_for_core = chat_api_override.clone();
        let transport_for_core = push_transport.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                api_for_core,
                transport_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            chat_api_override,
            push_transport,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Installs the platform socket. Outbound emissions made before this are dropped.
    pub fn set_push_transport(&self, transport: Box<dyn PushTransport>) {
        let transport: Arc<dyn PushTransport> = Arc::from(transport);
        match self.push_transport.write() {
            Ok(mut slot) => {
                *slot = Some(transport);
            }
            Err(poison) => {
                *poison.into_inner() = Some(transport);
            }
        }
    }

    /// Feeds one inbound socket event. Undecodable payloads are logged and dropped.
    pub fn push_event(&self, event: String, payload_json: String) {
        match PushEvent::decode(&event, &payload_json) {
            Ok(decoded) => {
                let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
                    InternalEvent::PushEventReceived(decoded),
                )));
            }
            Err(e) => tracing::warn!(%event, %e, "push: dropped inbound event"),
        }
    }

    pub fn push_connection_changed(&self, event: PushConnectionEvent) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::PushConnectionChanged(event),
        )));
    }
}

impl FfiApp {
    pub fn set_chat_api_for_tests(&self, api: Arc<dyn ChatApi>) {
        match self.chat_api_override.write() {
            Ok(mut slot) => {
                *slot = Some(api);
            }
            Err(poison) => {
                *poison.into_inner() = Some(api);
            }
        }
    }
}
