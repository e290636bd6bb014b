/// Position book: one position per pair.
///
/// Only the tracker mutates the book. Everything else reads through the
/// public accessors or serializes the whole book for persistence.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::Position;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &str) -> Option<&Position> {
        self.positions.get(pair)
    }

    pub fn contains(&self, pair: &str) -> bool {
        self.positions.contains_key(pair)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions ordered by pair.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Insert a position. Hands it back if the pair is already taken.
    pub(crate) fn insert(&mut self, position: Position) -> Result<(), Position> {
        if self.positions.contains_key(&position.pair) {
            return Err(position);
        }
        self.positions.insert(position.pair.clone(), position);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, pair: &str) -> Option<&mut Position> {
        self.positions.get_mut(pair)
    }

    pub(crate) fn remove(&mut self, pair: &str) -> Option<Position> {
        self.positions.remove(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_pair() {
        let mut book = PositionBook::new();
        book.insert(Position::new("SOL/USDT".into(), 100.0, 1.0, 2.0))
            .unwrap();
        let dup = book
            .insert(Position::new("SOL/USDT".into(), 120.0, 3.0, 2.0))
            .unwrap_err();
        assert_eq!(dup.entry_price, 120.0);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("SOL/USDT").unwrap().entry_price, 100.0);
    }

    #[test]
    fn iteration_is_ordered_by_pair() {
        let mut book = PositionBook::new();
        for pair in ["XRP/USDT", "ADA/USDT", "PEPE/USDT"] {
            book.insert(Position::new(pair.into(), 1.0, 1.0, 0.1)).unwrap();
        }
        let pairs: Vec<&str> = book.pairs().collect();
        assert_eq!(pairs, vec!["ADA/USDT", "PEPE/USDT", "XRP/USDT"]);
    }

    #[test]
    fn serializes_as_map_keyed_by_pair() {
        let mut book = PositionBook::new();
        book.insert(Position::new("BNB/USDT".into(), 300.0, 0.5, 4.0))
            .unwrap();
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["BNB/USDT"]["entry_price"], 300.0);
        let back: PositionBook = serde_json::from_value(json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn remove_empties_slot() {
        let mut book = PositionBook::new();
        book.insert(Position::new("JUP/USDT".into(), 1.0, 5.0, 0.1))
            .unwrap();
        assert!(book.remove("JUP/USDT").is_some());
        assert!(book.is_empty());
        assert!(book.remove("JUP/USDT").is_none());
    }
}
