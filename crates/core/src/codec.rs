//! Per-type binary codecs.
//!
//! [`Marshal`] and [`Unmarshal`] are the seam between user data and the wire.
//! Implementations cover the scalar types, strings, sequences, fixed-size
//! arrays and maps; composite types list their fields with [`sio_fields!`].
//!
//! Wire forms:
//!
//! | Type            | Encoding                                           |
//! |-----------------|----------------------------------------------------|
//! | scalars         | natural width, big-endian; `bool` is one byte      |
//! | `String`        | `u32` length, UTF-8 bytes, zero pad to 4           |
//! | `Vec<T>`        | `u32` count, then elements                         |
//! | `Vec<u8>`       | `u32` count, raw bytes, zero pad to 4              |
//! | `[T; N]`        | elements only, no count                            |
//! | maps            | `u32` count, then key/value pairs                  |
//!
//! [`sio_fields!`]: crate::sio_fields

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use crate::error::Result;
use crate::reader::Reader;
use crate::writer::Writer;

/// A value that can be written to a block payload.
pub trait Marshal {
    /// Append the encoding of `self` to `w`.
    fn marshal(&self, w: &mut Writer) -> Result<()>;

    /// Encode a counted sequence of `Self`.
    #[doc(hidden)]
    fn marshal_slice(items: &[Self], w: &mut Writer) -> Result<()>
    where
        Self: Sized,
    {
        w.write_len(items.len())?;
        for item in items {
            item.marshal(w)?;
        }
        Ok(())
    }
}

/// A value that can be decoded in place from a block payload.
pub trait Unmarshal {
    /// Overwrite `self` with the value decoded from `r`.
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()>;

    /// Decode a counted sequence of `Self` into `dst`.
    #[doc(hidden)]
    fn unmarshal_vec(dst: &mut Vec<Self>, r: &mut Reader<'_>) -> Result<()>
    where
        Self: Sized + Default,
    {
        let n = r.read_len()?;
        dst.clear();
        dst.reserve(n.min(r.remaining()));
        for _ in 0..n {
            let mut item = Self::default();
            item.unmarshal(r)?;
            dst.push(item);
        }
        Ok(())
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Marshal for $ty {
                fn marshal(&self, w: &mut Writer) -> Result<()> {
                    w.$write(*self)
                }
            }

            impl Unmarshal for $ty {
                fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
                    *self = r.$read()?;
                    Ok(())
                }
            }
        )*
    };
}

impl_scalar! {
    bool => write_bool, read_bool;
    u16 => write_u16, read_u16;
    i16 => write_i16, read_i16;
    u32 => write_u32, read_u32;
    i32 => write_i32, read_i32;
    u64 => write_u64, read_u64;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

// Byte sequences are written as one padded run rather than element by element.

impl Marshal for u8 {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_u8(*self)
    }

    fn marshal_slice(items: &[Self], w: &mut Writer) -> Result<()> {
        w.write_byte_seq(items)
    }
}

impl Unmarshal for u8 {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        *self = r.read_u8()?;
        Ok(())
    }

    fn unmarshal_vec(dst: &mut Vec<Self>, r: &mut Reader<'_>) -> Result<()> {
        let bytes = r.read_byte_seq()?;
        dst.clear();
        dst.extend_from_slice(bytes);
        Ok(())
    }
}

impl Marshal for i8 {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_i8(*self)
    }

    fn marshal_slice(items: &[Self], w: &mut Writer) -> Result<()> {
        let bytes: Vec<u8> = items.iter().map(|&b| b as u8).collect();
        w.write_byte_seq(&bytes)
    }
}

impl Unmarshal for i8 {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        *self = r.read_i8()?;
        Ok(())
    }

    fn unmarshal_vec(dst: &mut Vec<Self>, r: &mut Reader<'_>) -> Result<()> {
        let bytes = r.read_byte_seq()?;
        dst.clear();
        dst.extend(bytes.iter().map(|&b| b as i8));
        Ok(())
    }
}

impl Marshal for str {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_str(self)
    }
}

impl Marshal for String {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_str(self)
    }
}

impl Unmarshal for String {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        *self = r.read_string()?;
        Ok(())
    }
}

impl<T: Marshal + ?Sized> Marshal for &T {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        (**self).marshal(w)
    }
}

impl<T: Marshal + ?Sized> Marshal for Box<T> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        (**self).marshal(w)
    }
}

impl<T: Unmarshal + ?Sized> Unmarshal for Box<T> {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        (**self).unmarshal(r)
    }
}

impl<T: Marshal> Marshal for [T] {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        T::marshal_slice(self, w)
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        T::marshal_slice(self, w)
    }
}

impl<T: Unmarshal + Default> Unmarshal for Vec<T> {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        T::unmarshal_vec(self, r)
    }
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        for item in self {
            item.marshal(w)?;
        }
        Ok(())
    }
}

impl<T: Unmarshal, const N: usize> Unmarshal for [T; N] {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        for item in self.iter_mut() {
            item.unmarshal(r)?;
        }
        Ok(())
    }
}

impl<K: Marshal, V: Marshal> Marshal for BTreeMap<K, V> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_len(self.len())?;
        for (k, v) in self {
            k.marshal(w)?;
            v.marshal(w)?;
        }
        Ok(())
    }
}

impl<K, V> Unmarshal for BTreeMap<K, V>
where
    K: Unmarshal + Default + Ord,
    V: Unmarshal + Default,
{
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let n = r.read_len()?;
        self.clear();
        for _ in 0..n {
            let mut k = K::default();
            k.unmarshal(r)?;
            let mut v = V::default();
            v.unmarshal(r)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

/// Entries are written in the map's iteration order.
impl<K: Marshal, V: Marshal, S> Marshal for HashMap<K, V, S> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_len(self.len())?;
        for (k, v) in self {
            k.marshal(w)?;
            v.marshal(w)?;
        }
        Ok(())
    }
}

impl<K, V, S> Unmarshal for HashMap<K, V, S>
where
    K: Unmarshal + Default + Eq + Hash,
    V: Unmarshal + Default,
    S: BuildHasher,
{
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let n = r.read_len()?;
        self.clear();
        self.reserve(n.min(r.remaining()));
        for _ in 0..n {
            let mut k = K::default();
            k.unmarshal(r)?;
            let mut v = V::default();
            v.unmarshal(r)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

/// Implement [`Marshal`] and [`Unmarshal`] for a struct by encoding the listed
/// fields in order.
///
/// ```
/// use sio_core::{sio_fields, Reader, Writer};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Hit {
///     cell: u32,
///     energy: f64,
///     tags: Vec<String>,
/// }
///
/// sio_fields!(Hit { cell, energy, tags });
///
/// let hit = Hit { cell: 7, energy: 1.5, tags: vec!["ecal".into()] };
/// let mut w = Writer::new();
/// w.encode(&hit).unwrap();
///
/// let mut back = Hit::default();
/// Reader::new(w.bytes()).decode(&mut back).unwrap();
/// assert_eq!(back, hit);
/// ```
#[macro_export]
macro_rules! sio_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Marshal for $ty {
            fn marshal(&self, w: &mut $crate::Writer) -> $crate::Result<()> {
                $( $crate::Marshal::marshal(&self.$field, w)?; )*
                Ok(())
            }
        }

        impl $crate::Unmarshal for $ty {
            fn unmarshal(&mut self, r: &mut $crate::Reader<'_>) -> $crate::Result<()> {
                $( $crate::Unmarshal::unmarshal(&mut self.$field, r)?; )*
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;

    fn roundtrip<T>(value: &T) -> (T, usize)
    where
        T: Marshal + Unmarshal + Default,
    {
        let mut w = Writer::new();
        w.encode(value).unwrap();
        let len = w.len();
        let mut back = T::default();
        let mut r = Reader::new(w.bytes());
        r.decode(&mut back).unwrap();
        assert!(r.is_empty(), "trailing bytes after decode");
        (back, len)
    }

    #[derive(Debug, Default, PartialEq)]
    struct RunHeader {
        run: i32,
        detector: String,
        comments: Vec<String>,
        params: BTreeMap<String, f64>,
        seeds: [u64; 2],
    }

    crate::sio_fields!(RunHeader {
        run,
        detector,
        comments,
        params,
        seeds,
    });

    #[test]
    fn test_struct_fields_in_order() {
        let mut params = BTreeMap::new();
        params.insert("bfield".to_string(), 3.5);
        let hdr = RunHeader {
            run: 42,
            detector: "ILD".to_string(),
            comments: vec!["first".to_string(), "second".to_string()],
            params,
            seeds: [1, 2],
        };

        let (back, _) = roundtrip(&hdr);
        assert_eq!(back, hdr);
    }

    #[test]
    fn test_bytes_are_packed_and_padded() {
        let data = vec![1u8, 2, 3, 4, 5];
        let mut w = Writer::new();
        w.encode(&data).unwrap();
        assert_eq!(w.bytes(), &[0, 0, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn test_array_has_no_count() {
        let (back, len) = roundtrip(&[1u32, 2, 3]);
        assert_eq!(back, [1, 2, 3]);
        assert_eq!(len, 12);
    }

    #[test]
    fn test_bool_is_one_byte() {
        let (back, len) = roundtrip(&true);
        assert!(back);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_hashmap() {
        let mut m: HashMap<u32, String> = HashMap::new();
        m.insert(1, "one".into());
        m.insert(2, "two".into());
        let (back, _) = roundtrip(&m);
        assert_eq!(back, m);
    }

    #[test]
    fn test_truncated_vec_fails() {
        let data = [0, 0, 0, 3, 0, 0, 0, 1];
        let mut v: Vec<u32> = Vec::new();
        let err = Reader::new(&data).decode(&mut v).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEnd { .. }));
    }

    proptest! {
        #[test]
        fn prop_string_roundtrip(s in ".*") {
            let (back, len) = roundtrip(&s);
            prop_assert_eq!(&back, &s);
            prop_assert_eq!(len % 4, 0);
        }

        #[test]
        fn prop_scalar_vec_roundtrip(v in proptest::collection::vec(any::<i64>(), 0..64)) {
            let (back, len) = roundtrip(&v);
            prop_assert_eq!(back, v.clone());
            prop_assert_eq!(len, 4 + 8 * v.len());
        }

        #[test]
        fn prop_float_bits_preserved(x in any::<f64>()) {
            let (back, _) = roundtrip(&x);
            prop_assert_eq!(back.to_bits(), x.to_bits());
        }

        #[test]
        fn prop_bytes_roundtrip(v in proptest::collection::vec(any::<u8>(), 0..64)) {
            let (back, len) = roundtrip(&v);
            prop_assert_eq!(back, v.clone());
            prop_assert_eq!(len, 4 + crate::wire::align4(v.len()));
        }
    }
}
