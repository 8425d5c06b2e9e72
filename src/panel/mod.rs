pub mod message;
pub mod sync;
pub mod template;

use crate::editor::Editor;
use crate::session::DiffSession;
use anyhow::Result;
use message::{HostMessage, SurfaceMessage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sync::LineSyncTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Active,
    Disposed,
}

/// Options a surface is opened with. Asset loads are restricted to `asset_root`.
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub title: String,
    pub asset_root: PathBuf,
}

/// An isolated rendering destination. The host can only replace its whole
/// document and exchange JSON messages with it.
pub trait Surface {
    fn open(options: &SurfaceOptions) -> Self
    where
        Self: Sized;

    /// Origin string allowed by the document's content security policy
    fn csp_source(&self) -> String;

    /// URI the surface will load `path` (inside the asset root) from
    fn asset_uri(&self, path: &Path) -> String;

    fn set_html(&mut self, html: String);

    /// Fire-and-forget delivery of one serialized host message
    fn post_message(&mut self, wire: String);

    /// Serialized messages the surface sent since the last call
    fn take_inbound(&mut self) -> Vec<String>;
}

pub type MessageHandler = Box<dyn FnMut(&SurfaceMessage)>;

/// Owns the single rendering surface, its line-sync timer and the inbound
/// message handlers.
pub struct PanelChannel<S: Surface> {
    state: PanelState,
    asset_root: PathBuf,
    sync_interval: Duration,
    surface: Option<S>,
    timer: Option<LineSyncTimer>,
    handlers: Vec<MessageHandler>,
}

impl<S: Surface> PanelChannel<S> {
    pub fn new(asset_root: PathBuf, sync_interval: Duration) -> Self {
        Self {
            state: PanelState::Uninitialized,
            asset_root,
            sync_interval,
            surface: None,
            timer: None,
            handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == PanelState::Active
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    /// Open the surface, start the sync timer and show the loading view.
    /// Does nothing while already active.
    pub fn create(&mut self) {
        if self.is_active() {
            return;
        }

        let options = SurfaceOptions {
            title: "ASM Diff".to_string(),
            asset_root: self.asset_root.clone(),
        };
        self.surface = Some(S::open(&options));
        self.timer = Some(LineSyncTimer::start(self.sync_interval, Instant::now()));
        self.state = PanelState::Active;
        log::info!("panel opened (assets: {})", self.asset_root.display());

        if let Err(e) = self.render(template::LOADING_TEMPLATE, &HashMap::new()) {
            log::warn!("could not show loading view: {:#}", e);
        }
    }

    /// Load template `template_id`, fill in its placeholders and replace the
    /// surface's document. Ignored unless the panel is active.
    pub fn render(&mut self, template_id: &str, values: &HashMap<String, String>) -> Result<()> {
        let Some(surface) = self.surface.as_mut() else {
            log::debug!("render of {} dropped: panel not active", template_id);
            return Ok(());
        };

        let raw = template::load_template(&self.asset_root, template_id)?;
        let asset_root = &self.asset_root;
        let html = {
            let surface: &S = surface;
            template::substitute(&raw, &surface.csp_source(), values, |reference| {
                let resolved = template::resolve_asset_path(asset_root, template_id, reference);
                if resolved.is_none() {
                    log::warn!("asset {} escapes {}", reference, asset_root.display());
                }
                resolved.map(|path| surface.asset_uri(&path))
            })
        };
        surface.set_html(html);
        Ok(())
    }

    pub fn send(&mut self, message: &HostMessage) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(wire) => surface.post_message(wire),
            Err(e) => log::warn!("could not encode {:?}: {}", message, e),
        }
    }

    /// Register a handler for surface messages. Every handler sees every
    /// message, in registration order.
    pub fn on_message(&mut self, handler: MessageHandler) {
        self.handlers.push(handler);
    }

    /// Run one iteration of the panel's cadences: dispatch inbound messages
    /// and, when the sync timer fires, push the cursor line.
    pub fn tick(&mut self, now: Instant, editor: Option<&dyn Editor>) {
        if !self.is_active() {
            return;
        }

        let inbound = self
            .surface
            .as_mut()
            .map(|s| s.take_inbound())
            .unwrap_or_default();
        for wire in inbound {
            match serde_json::from_str::<SurfaceMessage>(&wire) {
                Ok(message) => {
                    for handler in self.handlers.iter_mut() {
                        handler(&message);
                    }
                }
                Err(e) => log::warn!("unrecognized surface message {}: {}", wire, e),
            }
        }

        let fired = self.timer.as_mut().is_some_and(|t| t.fire(now));
        if fired {
            if let Some(ping) = editor.and_then(sync::ping_for) {
                self.send(&ping);
            }
        }
    }

    /// How long the event loop may sleep before the next ping is due
    pub fn until_next_tick(&self, now: Instant) -> Option<Duration> {
        self.timer.as_ref().map(|t| t.until_due(now))
    }

    /// The surface was closed: stop the timer, forget the session's tracked
    /// function and drop the handlers.
    pub fn dispose(&mut self, session: &mut DiffSession) {
        if !self.is_active() {
            return;
        }
        self.state = PanelState::Disposed;
        self.timer = None;
        self.surface = None;
        self.handlers.clear();
        session.clear();
        log::info!("panel disposed");
    }
}
