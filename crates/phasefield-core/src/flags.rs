//! The [`EvalFlags`] bitset.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Which derivative orders of a field must be evaluated at quadrature points.
///
/// Compiled once per field and equation side by the dependency resolver and
/// handed unchanged to the per-cell evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EvalFlags(u8);

impl EvalFlags {
    /// Field value.
    pub const VALUE: Self = Self(1);
    /// Field gradient.
    pub const GRADIENT: Self = Self(1 << 1);
    /// Field Hessian (scalar fields only).
    pub const HESSIAN: Self = Self(1 << 2);
    /// Change in the field's solution over a nonlinear iteration.
    pub const CHANGE: Self = Self(1 << 3);

    const ALL: [(Self, &'static str); 4] = [
        (Self::VALUE, "value"),
        (Self::GRADIENT, "gradient"),
        (Self::HESSIAN, "hessian"),
        (Self::CHANGE, "change"),
    ];

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set every flag in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// `self | other`.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterate over the individual flags that are set, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |&flag| self.contains(flag))
    }
}

impl BitOr for EvalFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for EvalFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl FromIterator<EvalFlags> for EvalFlags {
    fn from_iter<I: IntoIterator<Item = EvalFlags>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::union)
    }
}

impl fmt::Display for EvalFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (flag, name) in Self::ALL {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_flags() -> impl Strategy<Value = EvalFlags> {
        (0u8..16).prop_map(EvalFlags)
    }

    #[test]
    fn display_lists_set_flags() {
        assert_eq!(EvalFlags::empty().to_string(), "none");
        assert_eq!(
            (EvalFlags::VALUE | EvalFlags::CHANGE).to_string(),
            "value|change"
        );
    }

    #[test]
    fn iter_yields_single_flags() {
        let flags = EvalFlags::GRADIENT | EvalFlags::HESSIAN;
        let parts: Vec<_> = flags.iter().collect();
        assert_eq!(parts, vec![EvalFlags::GRADIENT, EvalFlags::HESSIAN]);
    }

    proptest! {
        #[test]
        fn union_contains_both(a in arb_flags(), b in arb_flags()) {
            let u = a | b;
            prop_assert!(u.contains(a));
            prop_assert!(u.contains(b));
        }

        #[test]
        fn union_commutative(a in arb_flags(), b in arb_flags()) {
            prop_assert_eq!(a | b, b | a);
        }

        #[test]
        fn collect_matches_fold(flags in prop::collection::vec(arb_flags(), 0..8)) {
            let collected: EvalFlags = flags.iter().copied().collect();
            let mut folded = EvalFlags::empty();
            for f in &flags {
                folded |= *f;
            }
            prop_assert_eq!(collected, folded);
        }

        #[test]
        fn iter_round_trips(a in arb_flags()) {
            prop_assert_eq!(a.iter().collect::<EvalFlags>(), a);
        }
    }
}
