//! Built-in iterator implementations over the composite value types, per
//! spec.md's "Iterators are objects with `next() -> bool`, `key() -> value`,
//! `value() -> value`, `close()`" description and its note that iterators
//! are internally three-state machines (NotStarted, Running, Finished),
//! with `close` idempotent.
//!
//! Iterating an Array yields (index, element); a Dict yields (key, value);
//! a Str yields (byte-index, character); a Bytes yields (index, byte).

use crate::value::{ArrayRef, DictRef, Value, ValueIterator};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Running,
    Finished,
}

pub struct ArrayIter {
    array: ArrayRef,
    index: usize,
    state: State,
}

impl ArrayIter {
    pub fn new(array: ArrayRef) -> Self {
        ArrayIter {
            array,
            index: 0,
            state: State::NotStarted,
        }
    }
}

impl ValueIterator for ArrayIter {
    fn advance(&mut self) -> bool {
        if self.state == State::Finished {
            return false;
        }
        let len = self.array.borrow().len();
        let next_index = match self.state {
            State::NotStarted => 0,
            State::Running => self.index + 1,
            State::Finished => unreachable!(),
        };
        if next_index >= len {
            self.state = State::Finished;
            return false;
        }
        self.index = next_index;
        self.state = State::Running;
        true
    }

    fn key(&self) -> Value {
        Value::Int(self.index as i64)
    }

    fn current(&self) -> Value {
        self.array.borrow()[self.index].clone()
    }
}

pub struct DictIter {
    dict: DictRef,
    index: usize,
    state: State,
}

impl DictIter {
    pub fn new(dict: DictRef) -> Self {
        DictIter {
            dict,
            index: 0,
            state: State::NotStarted,
        }
    }
}

impl ValueIterator for DictIter {
    fn advance(&mut self) -> bool {
        if self.state == State::Finished {
            return false;
        }
        let len = self.dict.borrow().len();
        let next_index = match self.state {
            State::NotStarted => 0,
            State::Running => self.index + 1,
            State::Finished => unreachable!(),
        };
        if next_index >= len {
            self.state = State::Finished;
            return false;
        }
        self.index = next_index;
        self.state = State::Running;
        true
    }

    fn key(&self) -> Value {
        let map = self.dict.borrow();
        Value::str(map.get_index(self.index).unwrap().0.as_str())
    }

    fn current(&self) -> Value {
        let map = self.dict.borrow();
        map.get_index(self.index).unwrap().1.clone()
    }
}

/// Iterates a string's Unicode scalar values, keyed by byte offset.
pub struct StrIter {
    chars: Vec<(usize, char)>,
    index: usize,
    state: State,
}

impl StrIter {
    pub fn new(s: Rc<str>) -> Self {
        StrIter {
            chars: s.char_indices().collect(),
            index: 0,
            state: State::NotStarted,
        }
    }
}

impl ValueIterator for StrIter {
    fn advance(&mut self) -> bool {
        if self.state == State::Finished {
            return false;
        }
        let next_index = match self.state {
            State::NotStarted => 0,
            State::Running => self.index + 1,
            State::Finished => unreachable!(),
        };
        if next_index >= self.chars.len() {
            self.state = State::Finished;
            return false;
        }
        self.index = next_index;
        self.state = State::Running;
        true
    }

    fn key(&self) -> Value {
        Value::Int(self.chars[self.index].0 as i64)
    }

    fn current(&self) -> Value {
        Value::Char(self.chars[self.index].1)
    }
}

pub struct BytesIter {
    bytes: Rc<Vec<u8>>,
    index: usize,
    state: State,
}

impl BytesIter {
    pub fn new(bytes: Rc<Vec<u8>>) -> Self {
        BytesIter {
            bytes,
            index: 0,
            state: State::NotStarted,
        }
    }
}

impl ValueIterator for BytesIter {
    fn advance(&mut self) -> bool {
        if self.state == State::Finished {
            return false;
        }
        let next_index = match self.state {
            State::NotStarted => 0,
            State::Running => self.index + 1,
            State::Finished => unreachable!(),
        };
        if next_index >= self.bytes.len() {
            self.state = State::Finished;
            return false;
        }
        self.index = next_index;
        self.state = State::Running;
        true
    }

    fn key(&self) -> Value {
        Value::Int(self.index as i64)
    }

    fn current(&self) -> Value {
        Value::Uint(self.bytes[self.index] as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn array_iter_yields_index_and_element() {
        let arr = Rc::new(RefCell::new(vec![Value::Int(10), Value::Int(20)]));
        let mut it = ArrayIter::new(arr);
        assert!(it.advance());
        assert!(matches!(it.key(), Value::Int(0)));
        assert!(matches!(it.current(), Value::Int(10)));
        assert!(it.advance());
        assert!(matches!(it.key(), Value::Int(1)));
        assert!(!it.advance());
        assert!(!it.advance());
    }

    #[test]
    fn dict_iter_preserves_insertion_order() {
        let mut map = crate::value::DictMap::new();
        map.insert("b".to_string(), Value::Int(1));
        map.insert("a".to_string(), Value::Int(2));
        let dict = Rc::new(RefCell::new(map));
        let mut it = DictIter::new(dict);
        assert!(it.advance());
        assert_eq!(it.key().display_string(), "b");
        assert!(it.advance());
        assert_eq!(it.key().display_string(), "a");
        assert!(!it.advance());
    }

    #[test]
    fn str_iter_keys_by_byte_offset() {
        let mut it = StrIter::new(Rc::from("aé"));
        assert!(it.advance());
        assert!(matches!(it.key(), Value::Int(0)));
        assert!(it.advance());
        assert!(matches!(it.key(), Value::Int(1)));
        assert!(!it.advance());
    }

    #[test]
    fn empty_array_finishes_immediately() {
        let arr = Rc::new(RefCell::new(Vec::new()));
        let mut it = ArrayIter::new(arr);
        assert!(!it.advance());
        assert!(!it.advance());
    }
}
