//! Non-finite float guard
//!
//! The dynamic value model has no representation for NaN or the infinities,
//! and `serde_json` writes them as `null`. Values are walked once before
//! conversion so such a float is reported instead of being replaced.

use serde::ser::{self, Serialize};
use serde_json::Error;

type CheckResult = std::result::Result<(), Error>;

/// Fail if `value` contains a NaN or infinite float anywhere inside it
pub(crate) fn check_finite<T: Serialize + ?Sized>(value: &T) -> CheckResult {
    value.serialize(FiniteCheck)
}

fn check_float(v: f64) -> CheckResult {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ser::Error::custom(format!(
            "non-finite float {} cannot be stored",
            v
        )))
    }
}

struct FiniteCheck;

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> CheckResult {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> CheckResult {
        check_float(v)
    }

    // -------------------------------------------------------------------------
    // Scalars that cannot hold a float
    // -------------------------------------------------------------------------
    fn serialize_bool(self, _: bool) -> CheckResult {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> CheckResult {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> CheckResult {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> CheckResult {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> CheckResult {
        Ok(())
    }

    fn serialize_i128(self, _: i128) -> CheckResult {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> CheckResult {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> CheckResult {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> CheckResult {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> CheckResult {
        Ok(())
    }

    fn serialize_u128(self, _: u128) -> CheckResult {
        Ok(())
    }

    fn serialize_char(self, _: char) -> CheckResult {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> CheckResult {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> CheckResult {
        Ok(())
    }

    fn serialize_none(self) -> CheckResult {
        Ok(())
    }

    fn serialize_unit(self) -> CheckResult {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> CheckResult {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> CheckResult {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Wrappers and containers: recurse
    // -------------------------------------------------------------------------
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> CheckResult {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}
