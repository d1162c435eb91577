//! Default tag images.
//!
//! A tag without a custom image gets one of four defaults, picked from its
//! identifier so the choice is stable across calls, processes and devices.
//!
//! The hash is the 31-multiplier polynomial over UTF-16 code units with
//! wrapping 32-bit arithmetic (`h = 31 * h + unit`). It is fixed here rather
//! than taken from `std::hash`, whose output is not guaranteed across
//! releases.

use rand::Rng;

use crate::model::NO_UUID;

/// Fixed default image palette.
pub const DEFAULT_TAG_IMAGES: [&str; 4] = [
    "default_list_0",
    "default_list_1",
    "default_list_2",
    "default_list_3",
];

fn identifier_hash(identifier: &str) -> i32 {
    identifier
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Palette slot for a tag identifier or name.
///
/// The `NO_UUID` sentinel yields a random slot; it is only used for
/// transient, not yet saved tags.
pub fn palette_index(identifier: &str) -> usize {
    if identifier == NO_UUID {
        return rand::thread_rng().gen_range(0..DEFAULT_TAG_IMAGES.len());
    }
    let slots = DEFAULT_TAG_IMAGES.len() as u32;
    (identifier_hash(identifier).unsigned_abs() % slots) as usize
}

/// Default image name for a tag identifier or name.
pub fn palette_image(identifier: &str) -> &'static str {
    DEFAULT_TAG_IMAGES[palette_index(identifier)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_polynomial() {
        assert_eq!(identifier_hash(""), 0);
        assert_eq!(identifier_hash("a"), 97);
        assert_eq!(identifier_hash("ab"), 97 * 31 + 98);
        assert_eq!(identifier_hash("home"), 3_208_415);
    }

    #[test]
    fn same_identifier_same_slot() {
        let uuid = "01HZX3K9M2R8T4V6W8Y0A2C4E6";
        let first = palette_index(uuid);
        for _ in 0..16 {
            assert_eq!(palette_index(uuid), first);
        }
        assert_eq!(palette_index("home"), 3);
        assert_eq!(palette_image("home"), "default_list_3");
    }

    #[test]
    fn sentinel_stays_in_range() {
        for _ in 0..64 {
            assert!(palette_index(NO_UUID) < DEFAULT_TAG_IMAGES.len());
        }
    }

    #[test]
    fn overflowing_hashes_stay_in_range() {
        let long = "x".repeat(512);
        assert!(palette_index(&long) < DEFAULT_TAG_IMAGES.len());
    }
}
