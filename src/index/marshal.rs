// SPDX-License-Identifier: GPL-3.0-only
//! Reader for the Ruby Marshal 4.8 stream format.
//!
//! Only the types that appear in gem index files are understood. Object
//! references are resolved for strings and user-marshalled objects; a
//! reference to a container is rejected since indexes never produce one.

use crate::index::error::IndexError;

const MAJOR: u8 = 4;
const MINOR: u8 = 8;
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Vec<u8>),
    Symbol(String),
    Array(Vec<Value>),
    Hash(Vec<(Value, Value)>),
    /// `marshal_dump` output, e.g. `Gem::Version`
    UserMarshal { class: String, data: Box<Value> },
    Object { class: String, ivars: Vec<(String, Value)> },
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

/// Parse a complete Marshal stream
pub fn parse(data: &[u8]) -> Result<Value, IndexError> {
    let mut reader = Reader {
        data,
        pos: 0,
        symbols: Vec::new(),
        objects: Vec::new(),
        depth: 0,
    };

    let major = reader.byte()?;
    let minor = reader.byte()?;
    if major != MAJOR || minor != MINOR {
        return Err(IndexError::BadHeader { major, minor });
    }

    let value = reader.value()?;
    if reader.pos != data.len() {
        return Err(IndexError::TrailingData(reader.pos));
    }
    Ok(value)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    symbols: Vec<String>,
    /// Object table in registration order; `None` marks a container
    objects: Vec<Option<Value>>,
    depth: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8, IndexError> {
        let byte = *self.data.get(self.pos).ok_or(IndexError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: usize) -> Result<&[u8], IndexError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let end = end.ok_or(IndexError::Truncated(self.data.len()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Marshal's variable-length integer
    fn long(&mut self) -> Result<i64, IndexError> {
        let c = self.byte()? as i8;
        let value = match c {
            0 => 0,
            1..=4 => {
                let mut x: i64 = 0;
                for i in 0..c {
                    x |= (self.byte()? as i64) << (8 * i as u32);
                }
                x
            }
            -4..=-1 => {
                let mut x: i64 = -1;
                for i in 0..-c {
                    let shift = 8 * i as u32;
                    x &= !(0xff << shift);
                    x |= (self.byte()? as i64) << shift;
                }
                x
            }
            5..=127 => c as i64 - 5,
            _ => c as i64 + 5,
        };
        Ok(value)
    }

    /// A length or count; every counted element takes at least one byte
    fn count(&mut self) -> Result<usize, IndexError> {
        let offset = self.pos;
        let n = self.long()?;
        let n = usize::try_from(n).map_err(|_| IndexError::BadLength(offset))?;
        if n > self.remaining() {
            return Err(IndexError::Truncated(self.data.len()));
        }
        Ok(n)
    }

    /// Position in the symbol or object table
    fn index(&mut self) -> Result<usize, IndexError> {
        let offset = self.pos;
        let n = self.long()?;
        usize::try_from(n).map_err(|_| IndexError::BadLength(offset))
    }

    fn raw_string(&mut self) -> Result<Vec<u8>, IndexError> {
        let len = self.count()?;
        Ok(self.bytes(len)?.to_vec())
    }

    fn symbol(&mut self) -> Result<String, IndexError> {
        let offset = self.pos;
        match self.byte()? {
            b':' => self.new_symbol(),
            b';' => self.symbol_link(),
            tag => Err(IndexError::UnknownType { tag, offset }),
        }
    }

    fn new_symbol(&mut self) -> Result<String, IndexError> {
        let offset = self.pos;
        let bytes = self.raw_string()?;
        let name = String::from_utf8(bytes).map_err(|_| IndexError::InvalidUtf8(offset))?;
        self.symbols.push(name.clone());
        Ok(name)
    }

    fn symbol_link(&mut self) -> Result<String, IndexError> {
        let offset = self.pos;
        let index = self.index()?;
        self.symbols
            .get(index)
            .cloned()
            .ok_or(IndexError::BadLink { index, offset })
    }

    fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    fn register(&mut self, value: &Value) {
        self.objects.push(Some(value.clone()));
    }

    fn value(&mut self) -> Result<Value, IndexError> {
        if self.depth >= MAX_DEPTH {
            return Err(IndexError::TooDeep(self.pos));
        }
        self.depth += 1;
        let value = self.value_inner();
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self) -> Result<Value, IndexError> {
        let offset = self.pos;
        let tag = self.byte()?;
        match tag {
            b'0' => Ok(Value::Nil),
            b'T' => Ok(Value::Bool(true)),
            b'F' => Ok(Value::Bool(false)),
            b'i' => Ok(Value::Int(self.long()?)),
            b':' => Ok(Value::Symbol(self.new_symbol()?)),
            b';' => Ok(Value::Symbol(self.symbol_link()?)),
            b'"' => {
                let value = Value::Str(self.raw_string()?);
                self.register(&value);
                Ok(value)
            }
            b'I' => {
                // Instance variables (string encodings) carry nothing we need
                let value = self.value()?;
                let ivars = self.count()?;
                for _ in 0..ivars {
                    self.symbol()?;
                    self.value()?;
                }
                Ok(value)
            }
            b'[' => {
                let len = self.count()?;
                self.reserve();
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.value()?);
                }
                Ok(Value::Array(items))
            }
            b'{' | b'}' => {
                let len = self.count()?;
                self.reserve();
                let mut pairs = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.value()?;
                    let value = self.value()?;
                    pairs.push((key, value));
                }
                if tag == b'}' {
                    // Default value of the hash
                    self.value()?;
                }
                Ok(Value::Hash(pairs))
            }
            b'U' => {
                let class = self.symbol()?;
                let slot = self.reserve();
                let data = self.value()?;
                let value = Value::UserMarshal {
                    class,
                    data: Box::new(data),
                };
                self.objects[slot] = Some(value.clone());
                Ok(value)
            }
            b'o' => {
                let class = self.symbol()?;
                self.reserve();
                let len = self.count()?;
                let mut ivars = Vec::with_capacity(len);
                for _ in 0..len {
                    let name = self.symbol()?;
                    let value = self.value()?;
                    ivars.push((name, value));
                }
                Ok(Value::Object { class, ivars })
            }
            b'@' => {
                let offset = self.pos;
                let index = self.index()?;
                match self.objects.get(index) {
                    Some(Some(value)) => Ok(value.clone()),
                    _ => Err(IndexError::BadLink { index, offset }),
                }
            }
            tag => Err(IndexError::UnknownType { tag, offset }),
        }
    }
}
