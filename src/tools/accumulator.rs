//! Reassembly of tool calls from streamed fragments.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::arguments::{normalize_arguments, ArgumentParseError};
use crate::types::{ToolCallFragment, ToolCallRequest};

/// A call that was opened or first named by a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStarted {
    /// `None` until the backend supplies an id.
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Builds tool calls for one round from fragments in arrival order.
///
/// Fragments are matched to a call by id first, then by index. A fragment
/// with neither continues the most recently opened call. Consumed by
/// [`finish`](Self::finish), so no call can be finalized twice.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
    by_id: HashMap<String, usize>,
    by_index: HashMap<u32, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment.
    ///
    /// Returns the call when this fragment gave it its first non-empty name.
    /// Fragments without id, name or argument text are ignored.
    pub fn apply(&mut self, fragment: &ToolCallFragment) -> Option<CallStarted> {
        if fragment.is_empty() {
            return None;
        }
        let slot = self.resolve_slot(fragment);
        let call = &mut self.calls[slot];

        let mut started = None;
        if let Some(name) = fragment.name.as_deref().filter(|n| !n.is_empty()) {
            if call.name.is_empty() {
                started = Some(CallStarted {
                    id: call.id.clone(),
                    name: name.to_string(),
                });
            }
            call.name = name.to_string();
        }
        if let Some(args) = fragment.arguments.as_deref() {
            call.arguments.push_str(args);
        }
        started
    }

    fn resolve_slot(&mut self, fragment: &ToolCallFragment) -> usize {
        let id = fragment.id.as_deref().filter(|id| !id.is_empty());

        if let Some(id) = id {
            if let Some(&slot) = self.by_id.get(id) {
                return slot;
            }
            // A known index whose call has no id yet adopts this one.
            if let Some(slot) = fragment.index.and_then(|i| self.by_index.get(&i).copied()) {
                if self.calls[slot].id.is_none() {
                    self.calls[slot].id = Some(id.to_string());
                    self.by_id.insert(id.to_string(), slot);
                    return slot;
                }
            }
            return self.open(Some(id.to_string()), fragment.index);
        }

        if let Some(index) = fragment.index {
            return match self.by_index.get(&index) {
                Some(&slot) => slot,
                None => self.open(None, Some(index)),
            };
        }

        match self.calls.len() {
            0 => self.open(None, None),
            n => n - 1,
        }
    }

    fn open(&mut self, id: Option<String>, index: Option<u32>) -> usize {
        let slot = self.calls.len();
        if let Some(id) = &id {
            self.by_id.insert(id.clone(), slot);
        }
        if let Some(index) = index {
            self.by_index.insert(index, slot);
        }
        self.calls.push(PendingCall {
            id,
            ..Default::default()
        });
        slot
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Finalize every open call, in order of first appearance.
    ///
    /// Calls that never received an id get a generated one.
    pub fn finish(self) -> Vec<FinalizedToolCall> {
        self.calls
            .into_iter()
            .map(|call| {
                let id = call.id.unwrap_or_else(synthetic_call_id);
                let arguments = normalize_arguments(&call.arguments);
                FinalizedToolCall {
                    id,
                    name: call.name,
                    raw_arguments: call.arguments,
                    arguments,
                }
            })
            .collect()
    }
}

fn synthetic_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// A complete tool call with its normalized arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedToolCall {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
    pub arguments: Result<Map<String, Value>, ArgumentParseError>,
}

impl FinalizedToolCall {
    /// The request as recorded in the assistant message.
    ///
    /// Unparseable arguments are kept as the raw text so they can be echoed
    /// back to the backend unchanged.
    pub fn request(&self) -> ToolCallRequest {
        let arguments = match &self.arguments {
            Ok(map) => Value::Object(map.clone()),
            Err(_) => Value::String(self.raw_arguments.clone()),
        };
        ToolCallRequest {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments,
        }
    }
}
