use core::fmt::Write;

use heapless::String;
use log::warn;

use crate::constants::{
    DEFAULT_FLOAT_PRECISION, FIELD_SEPARATOR, KEY_VALUE_SEPARATOR, PAYLOAD_CAPACITY,
};

pub type Payload = String<PAYLOAD_CAPACITY>;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    // Encoded message does not fit the broker buffer
    Overflow,
}

/// One scalar of a telemetry message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    // Encoder precision
    Float(f32),
    // Explicit decimal places
    Fixed(f32, usize),
    Int(i64),
    // Written verbatim
    Text(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub tag: &'a str,
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    pub const fn new(tag: &'a str, value: Value<'a>) -> Self {
        Self { tag, value }
    }
}

/// How keys are written in front of each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    // ThingSpeak `field1=`, `field2=`, ... by position
    Positional,
    // The field's own tag, e.g. `rssi=`
    Tagged,
}

/// Builds `key=value&key=value` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    pub keys: KeyStyle,
    pub precision: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(KeyStyle::Positional)
    }
}

impl Encoder {
    pub const fn new(keys: KeyStyle) -> Self {
        Self {
            keys,
            precision: DEFAULT_FLOAT_PRECISION,
        }
    }

    pub const fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Encodes tagged fields, keyed according to the encoder's key style.
    pub fn encode(&self, fields: &[Field<'_>]) -> Result<Payload, Error> {
        let mut payload = Payload::new();

        for (index, field) in fields.iter().enumerate() {
            match self.keys {
                KeyStyle::Positional => self.write_pair(&mut payload, index, None, &field.value)?,
                KeyStyle::Tagged => {
                    self.write_pair(&mut payload, index, Some(field.tag), &field.value)?
                }
            }
        }

        Ok(payload)
    }

    /// Encodes bare values with ThingSpeak positional keys.
    pub fn encode_values(&self, values: &[Value<'_>]) -> Result<Payload, Error> {
        let mut payload = Payload::new();

        for (index, value) in values.iter().enumerate() {
            self.write_pair(&mut payload, index, None, value)?;
        }

        Ok(payload)
    }

    fn write_pair(
        &self,
        payload: &mut Payload,
        index: usize,
        tag: Option<&str>,
        value: &Value<'_>,
    ) -> Result<(), Error> {
        if index > 0 {
            payload.push(FIELD_SEPARATOR).map_err(|_| Error::Overflow)?;
        }

        match tag {
            Some(tag) => payload.push_str(tag).map_err(|_| Error::Overflow)?,
            None => write!(payload, "field{}", index + 1).map_err(|_| Error::Overflow)?,
        }
        payload
            .push(KEY_VALUE_SEPARATOR)
            .map_err(|_| Error::Overflow)?;

        match *value {
            Value::Float(v) => write!(payload, "{:.*}", self.precision, v),
            Value::Fixed(v, places) => write!(payload, "{:.*}", places, v),
            Value::Int(v) => write!(payload, "{}", v),
            Value::Text(text) => {
                if text.contains([FIELD_SEPARATOR, KEY_VALUE_SEPARATOR]) {
                    warn!(
                        "Field {} value {:?} contains a separator, the message will not decode",
                        index + 1,
                        text
                    );
                }
                payload.push_str(text).map_err(|_| core::fmt::Error)
            }
        }
        .map_err(|_| Error::Overflow)
    }
}
