use rustgst_sys as ffi;
use std::ffi::{c_void, CStr};
use std::ptr::NonNull;
use std::sync::Arc;

use super::{SignalError, SignalResult};
use crate::bridge::Bridge;
use crate::handle::ResourceKind;
use crate::object::{NativeObject, ObjectCore};
use crate::ownership::Ownership;

/// An enumeration of all possible value types.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ValueType {
    None,
    Boolean,
    Int,
    UInt,
    Double,
    String,
    Object,
    Pointer,
}

impl ValueType {
    fn from_raw(raw: i32) -> SignalResult<Self> {
        use ffi::GbValueType::*;
        const NONE: i32 = vtNone as i32;
        const BOOLEAN: i32 = vtBoolean as i32;
        const INT: i32 = vtInt as i32;
        const UINT: i32 = vtUInt as i32;
        const DOUBLE: i32 = vtDouble as i32;
        const STRING: i32 = vtString as i32;
        const OBJECT: i32 = vtObject as i32;
        const POINTER: i32 = vtPointer as i32;

        Ok(match raw {
            NONE => ValueType::None,
            BOOLEAN => ValueType::Boolean,
            INT => ValueType::Int,
            UINT => ValueType::UInt,
            DOUBLE => ValueType::Double,
            STRING => ValueType::String,
            OBJECT => ValueType::Object,
            POINTER => ValueType::Pointer,
            _ => return Err(SignalError::UnknownValueType(raw)),
        })
    }

    fn name(self) -> &'static str {
        match self {
            ValueType::None => "none",
            ValueType::Boolean => "boolean",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Pointer => "pointer",
        }
    }
}

/// One signal argument, decoded from its native value cell.
///
/// Object arguments stay raw addresses here; [`Signal::marshal`](super::Signal::marshal)
/// resolves them to wrappers through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    /// `None` for a null string.
    String(Option<String>),
    Object(Option<NonNull<c_void>>),
    Pointer(*mut c_void),
}

impl Value {
    /// Decodes a native value cell.
    ///
    /// # Safety
    /// `raw` must be a cell as produced by the native library: string data must point to a
    /// nul-terminated string (or be null) for the duration of the call.
    pub unsafe fn from_raw(raw: &ffi::GbValue) -> SignalResult<Self> {
        Ok(match ValueType::from_raw(raw.type_)? {
            ValueType::None => Value::None,
            ValueType::Boolean => Value::Boolean(raw.data.v_int != 0),
            ValueType::Int => Value::Int(raw.data.v_int),
            ValueType::UInt => Value::UInt(raw.data.v_uint),
            ValueType::Double => Value::Double(raw.data.v_double),
            ValueType::String => {
                let ptr = raw.data.v_string;
                Value::String(
                    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned()),
                )
            }
            ValueType::Object => Value::Object(NonNull::new(raw.data.v_pointer)),
            ValueType::Pointer => Value::Pointer(raw.data.v_pointer),
        })
    }

    /// Decodes `n` consecutive cells starting at `args`.
    ///
    /// # Safety
    /// `args` must point to `n` initialized cells, see [`from_raw`](Self::from_raw).
    pub(crate) unsafe fn from_raw_slice(
        args: *const ffi::GbValue,
        n: usize,
    ) -> SignalResult<Vec<Self>> {
        if args.is_null() || n == 0 {
            return Ok(Vec::new());
        }
        std::slice::from_raw_parts(args, n)
            .iter()
            .map(|raw| Value::from_raw(raw))
            .collect()
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Object(_) => ValueType::Object,
            Value::Pointer(_) => ValueType::Pointer,
        }
    }
}

/// A trait for plain values that can be taken out of a signal argument.
pub trait FromValue: Sized {
    const TYPE: ValueType;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const TYPE: ValueType = ValueType::Boolean;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const TYPE: ValueType = ValueType::Int;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for u64 {
    const TYPE: ValueType = ValueType::UInt;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const TYPE: ValueType = ValueType::Double;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for String {
    const TYPE: ValueType = ValueType::String;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(x) => x.clone(),
            _ => None,
        }
    }
}

/// A string argument that may be null.
impl FromValue for Option<String> {
    const TYPE: ValueType = ValueType::String;

    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(x) => Some(x.clone()),
            _ => None,
        }
    }
}

/// The decoded arguments of one emission, with typed accessors for marshal functions.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    signal: &'static str,
    values: &'a [Value],
}

impl<'a> Arguments<'a> {
    #[inline]
    pub fn new(signal: &'static str, values: &'a [Value]) -> Self {
        Self { signal, values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value at `index`.
    pub fn value(&self, index: usize) -> SignalResult<&'a Value> {
        self.values
            .get(index)
            .ok_or(SignalError::MissingArgument {
                signal: self.signal,
                expected: index + 1,
                given: self.values.len(),
            })
    }

    /// Returns the value at `index` as a `T`.
    pub fn get<T: FromValue>(&self, index: usize) -> SignalResult<T> {
        T::from_value(self.value(index)?).ok_or(SignalError::ArgumentType {
            index,
            expected: T::TYPE.name(),
        })
    }

    /// Returns the object address at `index`; `None` for a null object.
    pub fn object(&self, index: usize) -> SignalResult<Option<NonNull<c_void>>> {
        match self.value(index)? {
            Value::Object(ptr) => Ok(*ptr),
            _ => Err(SignalError::ArgumentType {
                index,
                expected: ValueType::Object.name(),
            }),
        }
    }

    /// Resolves the object at `index` to its canonical wrapper; `None` for a null object.
    ///
    /// Object arguments are borrowed from the emission, so a wrapper built here takes its own
    /// reference (or borrows a single-owner resource). An existing wrapper is returned as is.
    pub fn wrapper<T, F>(
        &self,
        bridge: &Bridge,
        index: usize,
        kind: ResourceKind,
        factory: F,
    ) -> SignalResult<Option<Arc<T>>>
    where
        T: NativeObject,
        F: FnOnce(ObjectCore) -> T,
    {
        let Some(ptr) = self.object(index)? else {
            return Ok(None);
        };
        let ownership = match kind {
            ResourceKind::RefCounted => Ownership::take_ref(),
            ResourceKind::SingleOwner => Ownership::borrowed(),
        };
        Ok(Some(bridge.object_for(ptr.as_ptr(), kind, ownership, factory)?))
    }
}
