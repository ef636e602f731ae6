use heapless::String;
use log::{debug, warn};

use crate::constants::{FIELD_CAPACITY, FIELD_SEPARATOR};
use crate::decode;
use crate::payload::KeyStyle;
use crate::record::{Layout, Quantity};

pub type FieldText = String<FIELD_CAPACITY>;

/// Most recent value of every field the consumer has seen.
///
/// A field is only overwritten when the incoming message carries a non-empty
/// value for it, so a partial or malformed message never blanks what is
/// already on screen.
#[derive(Debug, Default, Clone)]
pub struct LastReceived {
    values: [Option<FieldText>; Quantity::ALL.len()],
    messages: u32,
}

impl LastReceived {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, quantity: Quantity) -> Option<&str> {
        self.values[quantity.index()].as_deref()
    }

    /// Messages applied so far
    pub fn messages(&self) -> u32 {
        self.messages
    }

    /// Decodes `message` and stores every field it carries, returning how many
    /// fields were updated.
    pub fn apply(&mut self, message: &str, layout: Layout, keys: KeyStyle) -> usize {
        self.messages = self.messages.wrapping_add(1);
        let mut updated = 0;

        for (index, quantity) in layout.quantities().iter().enumerate() {
            let value = match keys {
                KeyStyle::Positional => decode::value(message, FIELD_SEPARATOR, index),
                KeyStyle::Tagged => {
                    decode::tagged_value(message, FIELD_SEPARATOR, quantity.tag()).unwrap_or("")
                }
            };

            if value.is_empty() {
                debug!("Field {:?} absent, keeping previous value", quantity);
                continue;
            }

            if self.store(*quantity, value) {
                updated += 1;
            }
        }

        if keys == KeyStyle::Tagged {
            for (key, _) in decode::pairs(message, FIELD_SEPARATOR) {
                if !layout.quantities().iter().any(|q| q.tag() == key) {
                    warn!("Unexpected field {:?} for layout {:?}", key, layout);
                }
            }
        }

        updated
    }

    fn store(&mut self, quantity: Quantity, value: &str) -> bool {
        let mut text = FieldText::new();
        if text.push_str(value).is_err() {
            warn!(
                "Field {:?} value is longer than {} bytes, keeping previous value",
                quantity, FIELD_CAPACITY
            );
            return false;
        }
        self.values[quantity.index()] = Some(text);
        true
    }
}
