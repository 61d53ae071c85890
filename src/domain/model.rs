use crate::domain::event::InteractionEvent;
use crate::utils::error::{PanelError, Result};
use crate::utils::validation::{validate_multiple_of, validate_non_empty_string, validate_range};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of one grid row; panel sizes are whole rows.
pub const ROW_WIDTH: usize = 9;
pub const MAX_PANEL_SIZE: usize = 54;
pub const MIN_QUANTITY: u8 = 1;
/// Host display-stack limit.
pub const MAX_QUANTITY: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&UserId> for UserId {
    fn from(value: &UserId) -> Self {
        value.clone()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque visual-kind token, interpreted only by the render adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Material(String);

impl Material {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Material {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The mutable display payload of an entry. Tick and click handlers may edit
/// it; the slot is re-rendered afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDisplay {
    pub material: Material,
    pub quantity: u8,
    pub name: String,
    pub lore: Vec<String>,
    /// Legacy variant value, only encoded when the adapter runs in legacy mode.
    pub data: u16,
}

impl EntryDisplay {
    pub fn new(material: impl Into<Material>) -> Self {
        let material = material.into();
        Self {
            name: material.as_str().to_string(),
            material,
            quantity: MIN_QUANTITY,
            lore: Vec::new(),
            data: 0,
        }
    }
}

pub type InteractHandler =
    Box<dyn for<'a> FnMut(&mut InteractionContext<'a>) -> anyhow::Result<()> + Send>;
pub type TickHandler = Box<dyn for<'a> FnMut(&mut TickContext<'a>) -> anyhow::Result<()> + Send>;
pub type LifecycleHook = Box<dyn FnMut(&UserId) -> anyhow::Result<()> + Send>;

/// What a click handler sees: the event, the clicked entry's display, and a
/// way to ask for the panel to be closed once the handler returns.
pub struct InteractionContext<'a> {
    event: &'a InteractionEvent,
    display: &'a mut EntryDisplay,
    close_requested: bool,
}

impl<'a> InteractionContext<'a> {
    pub(crate) fn new(event: &'a InteractionEvent, display: &'a mut EntryDisplay) -> Self {
        Self {
            event,
            display,
            close_requested: false,
        }
    }

    pub fn event(&self) -> &InteractionEvent {
        self.event
    }

    pub fn user_id(&self) -> &UserId {
        &self.event.user_id
    }

    pub fn display(&self) -> &EntryDisplay {
        self.display
    }

    pub fn display_mut(&mut self) -> &mut EntryDisplay {
        self.display
    }

    pub fn close_panel(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

/// What a tick handler sees: the entry's display, the tick number, and the
/// same close request a click handler has.
pub struct TickContext<'a> {
    user_id: &'a UserId,
    display: &'a mut EntryDisplay,
    tick: u64,
    close_requested: bool,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(user_id: &'a UserId, display: &'a mut EntryDisplay, tick: u64) -> Self {
        Self {
            user_id,
            display,
            tick,
            close_requested: false,
        }
    }

    pub fn user_id(&self) -> &UserId {
        self.user_id
    }

    /// 1-based number of the refresh pass being run.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn display(&self) -> &EntryDisplay {
        self.display
    }

    pub fn display_mut(&mut self) -> &mut EntryDisplay {
        self.display
    }

    pub fn close_panel(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

/// One addressable slot of a panel.
pub struct PanelEntry {
    slot: usize,
    display: EntryDisplay,
    on_interact: Option<InteractHandler>,
    on_tick: Option<TickHandler>,
}

impl PanelEntry {
    pub fn new(material: impl Into<Material>, slot: usize) -> Self {
        Self {
            slot,
            display: EntryDisplay::new(material),
            on_interact: None,
            on_tick: None,
        }
    }

    pub fn quantity(mut self, quantity: u8) -> Self {
        self.display.quantity = quantity;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.display.name = name.into();
        self
    }

    pub fn lore<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display.lore = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn data(mut self, data: u16) -> Self {
        self.display.data = data;
        self
    }

    pub fn on_interact<F>(mut self, handler: F) -> Self
    where
        F: for<'a> FnMut(&mut InteractionContext<'a>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_interact = Some(Box::new(handler));
        self
    }

    pub fn on_tick<F>(mut self, handler: F) -> Self
    where
        F: for<'a> FnMut(&mut TickContext<'a>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_tick = Some(Box::new(handler));
        self
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn display(&self) -> &EntryDisplay {
        &self.display
    }

    /// Runs the click handler; returns whether it asked for the panel to close.
    pub(crate) fn interact(&mut self, event: &InteractionEvent) -> anyhow::Result<bool> {
        let Some(handler) = self.on_interact.as_mut() else {
            return Ok(false);
        };
        let mut context = InteractionContext::new(event, &mut self.display);
        handler(&mut context)?;
        Ok(context.close_requested())
    }

    /// Runs the tick handler; returns whether it asked for the panel to close.
    pub(crate) fn tick(&mut self, user_id: &UserId, tick: u64) -> anyhow::Result<bool> {
        let Some(handler) = self.on_tick.as_mut() else {
            return Ok(false);
        };
        let mut context = TickContext::new(user_id, &mut self.display, tick);
        handler(&mut context)?;
        Ok(context.close_requested())
    }

    fn validate_for(&self, panel_size: usize) -> Result<()> {
        validate_range("entry.slot", self.slot, 0, panel_size.saturating_sub(1))
            .and_then(|_| {
                validate_range(
                    "entry.quantity",
                    self.display.quantity,
                    MIN_QUANTITY,
                    MAX_QUANTITY,
                )
            })
            .and_then(|_| {
                validate_non_empty_string("entry.material", self.display.material.as_str())
            })
            .map_err(construction_error)
    }
}

impl fmt::Debug for PanelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelEntry")
            .field("slot", &self.slot)
            .field("display", &self.display)
            .field("has_on_interact", &self.on_interact.is_some())
            .field("has_on_tick", &self.on_tick.is_some())
            .finish()
    }
}

/// A grid panel definition: size, title, entries and lifecycle hooks.
///
/// Construction validates everything the host grid cares about, so a `Panel`
/// that exists can always be opened as far as layout is concerned.
pub struct Panel {
    size: usize,
    title: String,
    entries: Vec<PanelEntry>,
    on_open: Option<LifecycleHook>,
    on_close: Option<LifecycleHook>,
}

impl Panel {
    pub fn new(size: usize, title: impl Into<String>) -> Result<Self> {
        validate_size(size)?;
        Ok(Self {
            size,
            title: title.into(),
            entries: Vec::new(),
            on_open: None,
            on_close: None,
        })
    }

    pub fn with_entry(mut self, entry: PanelEntry) -> Result<Self> {
        self.add_entry(entry)?;
        Ok(self)
    }

    pub fn add_entry(&mut self, entry: PanelEntry) -> Result<()> {
        entry.validate_for(self.size)?;
        if self.entry_at(entry.slot).is_some() {
            return Err(PanelError::configuration(format!(
                "Slot {} is already occupied in panel '{}'",
                entry.slot, self.title
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&UserId) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_open = Some(Box::new(hook));
        self
    }

    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&UserId) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn rows(&self) -> usize {
        self.size / ROW_WIDTH
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entries(&self) -> &[PanelEntry] {
        &self.entries
    }

    pub fn entry_at(&self, slot: usize) -> Option<&PanelEntry> {
        self.entries.iter().find(|entry| entry.slot == slot)
    }

    pub(crate) fn entry_at_mut(&mut self, slot: usize) -> Option<&mut PanelEntry> {
        self.entries.iter_mut().find(|entry| entry.slot == slot)
    }

    pub(crate) fn slots(&self) -> Vec<usize> {
        self.entries.iter().map(PanelEntry::slot).collect()
    }

    pub(crate) fn fire_open(&mut self, user: &UserId) -> anyhow::Result<()> {
        match self.on_open.as_mut() {
            Some(hook) => hook(user),
            None => Ok(()),
        }
    }

    pub(crate) fn fire_close(&mut self, user: &UserId) -> anyhow::Result<()> {
        match self.on_close.as_mut() {
            Some(hook) => hook(user),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panel")
            .field("size", &self.size)
            .field("title", &self.title)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

/// 尺寸必須是 9 的正整數倍，且不超過 54
fn validate_size(size: usize) -> Result<()> {
    validate_range("panel.size", size, ROW_WIDTH, MAX_PANEL_SIZE)
        .and_then(|_| validate_multiple_of("panel.size", size, ROW_WIDTH))
        .map_err(construction_error)
}

/// Panel and entry construction only ever fails with `ConfigurationError`;
/// the field detail moves into the message.
fn construction_error(err: PanelError) -> PanelError {
    match err {
        PanelError::InvalidConfigValueError {
            field,
            value,
            reason,
        } => PanelError::configuration(format!("{} = {}: {}", field, value, reason)),
        other => other,
    }
}
