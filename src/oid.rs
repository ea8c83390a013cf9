//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` so the usual MIB-2 paths never
//! touch the heap.

use crate::error::{DecodeErrorKind, Error, OidErrorKind, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// RFC 2578 §3.5: "there are at most 128 sub-identifiers in a value".
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
///
/// An immutable, ordered sequence of arcs. Ordering is lexicographic by arc,
/// which is the order agents walk their MIB in.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from arc values.
    ///
    /// ```
    /// use snmp_wire::oid::Oid;
    ///
    /// let oid = Oid::new([1, 3, 6, 1]);
    /// assert_eq!(oid.arcs(), &[1, 3, 6, 1]);
    /// ```
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted notation (e.g. `"1.3.6.1.2.1.1.1.0"`).
    ///
    /// A single leading dot, as printed by net-snmp tools, is accepted.
    /// Empty components, non-numeric arcs, arcs above `u32::MAX`, a lone
    /// arc and invalid first/second arcs are rejected.
    ///
    /// ```
    /// use snmp_wire::oid::Oid;
    ///
    /// let oid = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
    /// assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    /// assert_eq!(Oid::parse(".1.3.6").unwrap().to_string(), "1.3.6");
    ///
    /// assert!(Oid::parse("1..3").is_err());
    /// assert!(Oid::parse("3.1").is_err());
    /// assert!(Oid::parse("1").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let body = s.strip_prefix('.').unwrap_or(s);
        if body.is_empty() {
            return Err(Error::invalid_oid_with_input(OidErrorKind::Empty, s));
        }

        let mut arcs = SmallVec::new();
        for part in body.split('.') {
            let arc: u32 = part
                .parse()
                .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s))?;
            arcs.push(arc);
        }

        let oid = Self { arcs };
        oid.validate().map_err(|e| match e {
            Error::InvalidOid { kind, .. } => Error::invalid_oid_with_input(kind, s),
            other => other,
        })?;
        Ok(oid)
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Get the number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the OID is empty.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Whether `self` lies in the subtree rooted at `prefix`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// Get the parent OID (all arcs except the last).
    pub fn parent(&self) -> Option<Oid> {
        let (_, head) = self.arcs.split_last()?;
        Some(Self::from_slice(head))
    }

    /// Create a child OID by appending an arc.
    ///
    /// ```
    /// use snmp_wire::oid;
    ///
    /// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1);
    /// assert_eq!(sys_descr.child(0).to_string(), "1.3.6.1.2.1.1.1.0");
    /// ```
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }

    /// Validate arcs per X.690 §8.19.4 and the RFC 2578 length limit.
    ///
    /// - arc1 must be 0, 1, or 2, and be followed by arc2
    /// - arc2 must be <= 39 when arc1 is 0 or 1
    ///
    /// The empty OID is valid and encodes as empty content.
    pub fn validate(&self) -> Result<()> {
        if self.arcs.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid(OidErrorKind::TooManyArcs {
                count: self.arcs.len(),
                max: MAX_OID_LEN,
            }));
        }
        match self.arcs[..] {
            [first, ..] if first > 2 => {
                Err(Error::invalid_oid(OidErrorKind::InvalidFirstArc(first)))
            }
            [_] => Err(Error::invalid_oid(OidErrorKind::SingleArc)),
            [first, second, ..] if first < 2 && second >= 40 => {
                Err(Error::invalid_oid(OidErrorKind::InvalidSecondArc {
                    first,
                    second,
                }))
            }
            [2, second, ..] if second > u32::MAX - 80 => {
                Err(Error::invalid_oid(OidErrorKind::SubidentifierOverflow))
            }
            _ => Ok(()),
        }
    }

    /// Encode the OID content octets (no tag or length).
    ///
    /// The first two arcs share one subidentifier, `40 * arc1 + arc2`; every
    /// subidentifier is base-128 with the continuation bit on all but its
    /// last octet. An empty OID encodes as empty content.
    ///
    /// Only OIDs that pass [`validate`](Self::validate) round-trip; the
    /// PDU encoders check that before calling this.
    pub fn to_ber_smallvec(&self) -> SmallVec<[u8; 64]> {
        let mut bytes = SmallVec::new();
        let (first, rest): (u32, &[u32]) = match self.arcs[..] {
            [] => return bytes,
            [a] => (a.wrapping_mul(40), &[]),
            [a, b, ..] => (a.wrapping_mul(40).wrapping_add(b), &self.arcs[2..]),
        };
        push_subidentifier(&mut bytes, first);
        for &arc in rest {
            push_subidentifier(&mut bytes, arc);
        }
        bytes
    }

    /// Encode the OID content octets into a `Vec`.
    pub fn to_ber(&self) -> Vec<u8> {
        self.to_ber_smallvec().to_vec()
    }

    /// Decode OID content octets.
    ///
    /// Inverts the `40 * X + Y` packing of the first subidentifier and
    /// enforces [`MAX_OID_LEN`].
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        let mut arcs = SmallVec::new();
        let mut pos = 0;

        while pos < data.len() {
            let (value, consumed) = read_subidentifier(&data[pos..], pos)?;
            if pos == 0 {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            pos += consumed;

            if arcs.len() > MAX_OID_LEN {
                return Err(Error::decode(pos, DecodeErrorKind::InvalidOidEncoding));
            }
        }

        Ok(Self { arcs })
    }
}

fn push_subidentifier(bytes: &mut SmallVec<[u8; 64]>, value: u32) {
    let groups = (32 - value.leading_zeros()).div_ceil(7).max(1);
    for i in (0..groups).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7F) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
    }
}

/// Read one base-128 subidentifier, returning (value, octets consumed).
fn read_subidentifier(data: &[u8], base: usize) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > (u32::MAX >> 7) {
            return Err(Error::decode(base + i, DecodeErrorKind::InvalidOidEncoding));
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    // continuation bit set on the final octet
    Err(Error::decode(base + data.len(), DecodeErrorKind::InvalidOidEncoding))
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut arcs = self.arcs.iter();
        if let Some(first) = arcs.next() {
            write!(f, "{}", first)?;
            for arc in arcs {
                write!(f, ".{}", arc)?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.arcs.cmp(&other.arcs)
    }
}

/// Build an [`Oid`] from literal arcs.
///
/// ```
/// use snmp_wire::oid;
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr.to_string(), "1.3.6.1.2.1.1.1.0");
/// assert!(sys_descr.starts_with(&oid!(1, 3, 6, 1, 2, 1, 1)));
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}
