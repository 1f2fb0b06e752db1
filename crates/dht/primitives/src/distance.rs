//! Prefix distance between identifiers.

use crate::{IDENTIFIER_BITS, Identifier};

/// Bits of the scalar distance spent on the mismatch position. `2^9 = 512`.
const POSITION_BITS: u32 = 9;

/// Bits of the scalar distance spent on the bits that follow the first mismatch.
const TIEBREAK_BITS: usize = 32 - POSITION_BITS as usize;

/// Number of identical leading bits of `a` and `b`.
///
/// Returns [`IDENTIFIER_BITS`] only when the identifiers are equal.
pub fn matching_bits(a: &Identifier, b: &Identifier) -> usize {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .enumerate()
        .find(|(_, (x, y))| x != y)
        .map_or(IDENTIFIER_BITS, |(byte, (x, y))| {
            byte * 8 + (x ^ y).leading_zeros() as usize
        })
}

/// Bucket that `other` falls into relative to `local`.
///
/// Bucket `0` holds identifiers sharing all but the last bit with `local`, bucket
/// `IDENTIFIER_BITS - 1` holds those differing in the first bit. Returns `None`
/// for `local` itself, which belongs to no bucket.
pub fn bucket_index(local: &Identifier, other: &Identifier) -> Option<usize> {
    let matching = matching_bits(local, other);
    (matching < IDENTIFIER_BITS).then(|| IDENTIFIER_BITS - matching - 1)
}

/// Monotone 32-bit closeness of `have` to `target`.
///
/// The top nine bits encode how many bits mismatch, the remaining 23 bits copy
/// the XOR of the bits that follow the first mismatch. Equal identifiers map to
/// `0`, identifiers differing in the first bit map to `u32::MAX` and every other
/// pair stays strictly below that.
pub fn scalar_distance(target: &Identifier, have: &Identifier) -> u32 {
    let matching = matching_bits(target, have);
    if matching == IDENTIFIER_BITS {
        return 0;
    }
    if matching == 0 {
        return u32::MAX;
    }

    let msb = ((IDENTIFIER_BITS - matching) as u32) << TIEBREAK_BITS;
    let lsb = (matching + 1..IDENTIFIER_BITS.min(matching + 1 + TIEBREAK_BITS))
        .filter(|&i| target.bit(i) != have.bit(i))
        .fold(0u32, |acc, i| acc | (1 << (matching + TIEBREAK_BITS - i)));

    // `matching == 1` with every tie-break bit set would reach `u32::MAX`.
    (msb | lsb).min(u32::MAX - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id_from_byte(b: u8) -> Identifier {
        let mut bytes = [0u8; 64];
        bytes[0] = b;
        Identifier::new(bytes)
    }

    fn arb_identifier() -> impl Strategy<Value = Identifier> {
        proptest::collection::vec(any::<u8>(), 64)
            .prop_map(|v| Identifier::from_slice(&v).unwrap_or(Identifier::ZERO))
    }

    #[test]
    fn test_matching_bits() {
        assert_eq!(matching_bits(&id_from_byte(0x00), &id_from_byte(0x80)), 0);
        assert_eq!(matching_bits(&id_from_byte(0x00), &id_from_byte(0x01)), 7);
        assert_eq!(
            matching_bits(&id_from_byte(0x42), &id_from_byte(0x42)),
            IDENTIFIER_BITS
        );

        let a = Identifier::ZERO;
        let b = a.with_flipped_bit(300);
        assert_eq!(matching_bits(&a, &b), 300);
    }

    #[test]
    fn test_bucket_index() {
        let local = Identifier::ZERO;
        assert_eq!(bucket_index(&local, &local), None);
        assert_eq!(
            bucket_index(&local, &local.with_flipped_bit(0)),
            Some(IDENTIFIER_BITS - 1)
        );
        assert_eq!(
            bucket_index(&local, &local.with_flipped_bit(IDENTIFIER_BITS - 1)),
            Some(0)
        );
    }

    #[test]
    fn test_scalar_distance_edges() {
        let a = Identifier::digest(b"a");
        assert_eq!(scalar_distance(&a, &a), 0);
        assert_eq!(scalar_distance(&a, &a.with_flipped_bit(0)), u32::MAX);

        // one matching bit, every following bit different
        let target = Identifier::ZERO;
        let mut bytes = [0xffu8; 64];
        bytes[0] = 0x7f;
        let have = Identifier::new(bytes);
        assert_eq!(matching_bits(&target, &have), 1);
        assert_eq!(scalar_distance(&target, &have), u32::MAX - 1);
    }

    #[test]
    fn test_scalar_distance_tiebreak() {
        let target = Identifier::ZERO;
        let near = target.with_flipped_bit(10).with_flipped_bit(30);
        let far = target.with_flipped_bit(10).with_flipped_bit(12);

        assert_eq!(matching_bits(&target, &near), matching_bits(&target, &far));
        assert!(scalar_distance(&target, &near) < scalar_distance(&target, &far));
    }

    #[test]
    fn test_scalar_distance_near_end() {
        let target = Identifier::ZERO;
        let have = target.with_flipped_bit(IDENTIFIER_BITS - 1);
        assert_eq!(scalar_distance(&target, &have), 1 << TIEBREAK_BITS);
    }

    proptest! {
        #[test]
        fn distance_orders_by_matching_bits(
            target in arb_identifier(),
            a in arb_identifier(),
            b in arb_identifier(),
        ) {
            let ma = matching_bits(&target, &a);
            let mb = matching_bits(&target, &b);
            if ma > mb {
                prop_assert!(scalar_distance(&target, &a) < scalar_distance(&target, &b));
            }
        }

        #[test]
        fn distance_orders_flipped_bits(target in arb_identifier(), i in 0usize..511, j in 0usize..511) {
            let a = target.with_flipped_bit(i.max(j) + 1);
            let b = target.with_flipped_bit(i.min(j));
            prop_assert!(scalar_distance(&target, &a) < scalar_distance(&target, &b));
        }

        #[test]
        fn bucket_index_is_in_range(a in arb_identifier(), b in arb_identifier()) {
            match bucket_index(&a, &b) {
                Some(index) => prop_assert!(index < IDENTIFIER_BITS),
                None => prop_assert_eq!(a, b),
            }
        }
    }
}
