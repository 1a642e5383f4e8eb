use crate::protocol::{verb, Frame};
use crate::types::IoDirection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A device-state category, the key under which the latest observed record
/// for that part of the device is cached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Device identity and capabilities (VER)
    Device,
    /// Network configuration (IP / SET)
    Network,
    /// Audio source configuration, per channel
    Source(u32),
    /// Audio destination configuration, per channel
    Destination(u32),
    /// GPI pin states, per channel
    Gpi(u32),
    /// GPO pin states, per channel
    Gpo(u32),
    /// Silence/clip alert state, per direction and channel
    Level(IoDirection, u32),
    /// Meter readings, per direction and channel
    Meter(IoDirection, u32),
    /// Matrix-mixer crosspoint
    Matrix(u32),
}

impl Category {
    /// Category an unsolicited frame belongs to, or `None` for frames that
    /// carry no cacheable state
    pub fn of(frame: &Frame) -> Option<Category> {
        match frame.verb.as_str() {
            verb::VER => Some(Category::Device),
            verb::IP | verb::SET => Some(Category::Network),
            verb::SOURCE => Some(Category::Source(frame.channel()?)),
            verb::DESTINATION => Some(Category::Destination(frame.channel()?)),
            verb::GPI => Some(Category::Gpi(frame.channel()?)),
            verb::GPO => Some(Category::Gpo(frame.channel()?)),
            verb::LEVEL => Some(Category::Level(direction_of(frame)?, frame.channel()?)),
            verb::METER => Some(Category::Meter(direction_of(frame)?, frame.channel()?)),
            verb::MIX => Some(Category::Matrix(frame.channel()?)),
            _ => None,
        }
    }
}

fn direction_of(frame: &Frame) -> Option<IoDirection> {
    frame
        .key
        .as_deref()?
        .split_whitespace()
        .next()
        .and_then(IoDirection::from_wire)
}

/// In-memory mirror of device state.
///
/// Holds the most recently observed frame per [`Category`]. Records are
/// replaced whole, never merged field by field, so a snapshot taken
/// concurrently with an update is either the old record or the new one.
#[derive(Default)]
pub struct StateCache {
    inner: Mutex<HashMap<Category, Arc<Frame>>>,
}

impl StateCache {
    /// Merge a notification frame into the cache; returns the category the
    /// frame landed in, if it carries cacheable state
    pub(crate) fn update(&self, frame: &Arc<Frame>) -> Option<Category> {
        let category = Category::of(frame)?;
        self.inner
            .lock()
            .unwrap()
            .insert(category.clone(), frame.clone());
        Some(category)
    }

    /// The latest record for a category, if one has been observed
    pub fn snapshot(&self, category: &Category) -> Option<Arc<Frame>> {
        self.inner.lock().unwrap().get(category).cloned()
    }

    /// Categories currently present in the cache
    pub fn categories(&self) -> Vec<Category> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}
