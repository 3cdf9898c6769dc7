use crate::domain::order::{Message, Order};
use crate::error::Result;
use serde::Deserialize;
use std::io::Read;

/// Initial orders (and their chat history) loaded by the binary.
#[derive(Debug, Deserialize)]
pub struct Seed {
    pub orders: Vec<Order>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Seed {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }
}
