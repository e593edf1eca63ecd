//! Passive-region masks.
//!
//! Three per-element flags take elements out of the design:
//!
//! - `void`: always empty
//! - `solid`: always full (clamped in the imported load case)
//! - `loaded`: always full, carries load
//!
//! An element may carry at most one flag.

use crate::error::{Error, Result};

/// Per-element passive flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassiveMasks {
    void: Vec<bool>,
    solid: Vec<bool>,
    loaded: Vec<bool>,
}

impl PassiveMasks {
    /// All elements designable.
    pub fn none(n_elements: usize) -> Self {
        Self {
            void: vec![false; n_elements],
            solid: vec![false; n_elements],
            loaded: vec![false; n_elements],
        }
    }

    /// Build from boolean flags.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if the lengths differ,
    /// [`Error::OverlappingMasks`] if an element carries more than one flag.
    pub fn new(void: Vec<bool>, solid: Vec<bool>, loaded: Vec<bool>) -> Result<Self> {
        let n = void.len();
        for (what, mask) in [("solid mask", &solid), ("loaded mask", &loaded)] {
            if mask.len() != n {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: n,
                    actual: mask.len(),
                });
            }
        }

        for element in 0..n {
            let flags = void[element] as u8 + solid[element] as u8 + loaded[element] as u8;
            if flags > 1 {
                return Err(Error::OverlappingMasks { element });
            }
        }

        Ok(Self { void, solid, loaded })
    }

    /// Build from 0/1 floating-point flags, as stored in design vectors.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMask`] for any value other than exactly 0 or 1, plus
    /// the errors of [`PassiveMasks::new`].
    pub fn from_flags(void: &[f64], solid: &[f64], loaded: &[f64]) -> Result<Self> {
        Self::new(
            to_bools("void", void)?,
            to_bools("solid", solid)?,
            to_bools("loaded", loaded)?,
        )
    }

    /// Number of elements covered.
    pub fn len(&self) -> usize {
        self.void.len()
    }

    pub fn is_empty(&self) -> bool {
        self.void.is_empty()
    }

    #[inline]
    pub fn is_void(&self, element: usize) -> bool {
        self.void[element]
    }

    #[inline]
    pub fn is_solid(&self, element: usize) -> bool {
        self.solid[element]
    }

    #[inline]
    pub fn is_loaded(&self, element: usize) -> bool {
        self.loaded[element]
    }

    /// True when no passive flag is set.
    #[inline]
    pub fn is_designable(&self, element: usize) -> bool {
        !(self.void[element] || self.solid[element] || self.loaded[element])
    }

    /// Number of designable elements.
    pub fn n_designable(&self) -> usize {
        (0..self.len()).filter(|&e| self.is_designable(e)).count()
    }

    /// Check that the masks cover `n_elements` elements.
    pub fn check_len(&self, n_elements: usize) -> Result<()> {
        if self.len() != n_elements {
            return Err(Error::DimensionMismatch {
                what: "passive masks",
                expected: n_elements,
                actual: self.len(),
            });
        }
        Ok(())
    }
}

fn to_bools(mask: &'static str, flags: &[f64]) -> Result<Vec<bool>> {
    flags
        .iter()
        .enumerate()
        .map(|(element, &value)| {
            if value == 0.0 {
                Ok(false)
            } else if value == 1.0 {
                Ok(true)
            } else {
                Err(Error::InvalidMask {
                    mask,
                    element,
                    value,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let masks =
            PassiveMasks::from_flags(&[1.0, 0.0, 0.0, 0.0], &[0.0, 1.0, 0.0, 0.0], &[0.0, 0.0, 1.0, 0.0])
                .unwrap();
        assert!(masks.is_void(0));
        assert!(masks.is_solid(1));
        assert!(masks.is_loaded(2));
        assert!(masks.is_designable(3));
        assert_eq!(masks.n_designable(), 1);
    }

    #[test]
    fn test_none() {
        let masks = PassiveMasks::none(6);
        assert_eq!(masks.len(), 6);
        assert_eq!(masks.n_designable(), 6);
    }

    #[test]
    fn test_non_binary_flag_rejected() {
        let err = PassiveMasks::from_flags(&[0.0, 0.5], &[0.0, 0.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidMask { mask: "void", element: 1, .. }
        ));
    }

    #[test]
    fn test_overlap_rejected() {
        let err = PassiveMasks::new(vec![false, true], vec![false, false], vec![false, true])
            .unwrap_err();
        assert!(matches!(err, Error::OverlappingMasks { element: 1 }));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            PassiveMasks::new(vec![false; 3], vec![false; 2], vec![false; 3]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(PassiveMasks::none(4).check_len(5).is_err());
    }
}
