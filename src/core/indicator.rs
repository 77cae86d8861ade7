//! The packed ownership/action indicator carried by every cell
//! (spec.md §3, "Indicator (3x3 state)").
//!
//! Stored as a single byte exactly as `tamra/includes/core/Cell.h` packs
//! it: `indicator % 3` is the action, `indicator / 3` is the ownership
//! band. Values 6-8 (ownership band 2 with any action) are the reserved
//! `Boundary` region spec.md's Open Questions note is "not meaningfully
//! exercised in tests".

/// Who currently owns a cell, from the local rank's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    ThisProc,
    OtherProc,
    Boundary,
}

/// A pending structural action recorded on a cell, materialized only
/// when a manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Refine,
    Coarsen,
}

/// The packed `(Ownership, Action)` pair, one byte per cell.
///
/// Getters on a non-leaf cell return whatever was last set directly on
/// it — spec.md's Open Questions leave interior-cell indicator semantics
/// advisory; effective ownership of an interior cell is derived by the
/// managers walking its descendants, not read off this field.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Indicator(u8);

impl Indicator {
    const fn pack(ownership: Ownership, action: Action) -> u8 {
        let band = match ownership {
            Ownership::ThisProc => 0,
            Ownership::OtherProc => 1,
            Ownership::Boundary => 2,
        };
        let act = match action {
            Action::None => 0,
            Action::Refine => 1,
            Action::Coarsen => 2,
        };
        band * 3 + act
    }

    pub fn new(ownership: Ownership, action: Action) -> Self {
        Indicator(Self::pack(ownership, action))
    }

    pub fn ownership(&self) -> Ownership {
        match self.0 / 3 {
            0 => Ownership::ThisProc,
            1 => Ownership::OtherProc,
            _ => Ownership::Boundary,
        }
    }

    pub fn action(&self) -> Action {
        match self.0 % 3 {
            0 => Action::None,
            1 => Action::Refine,
            _ => Action::Coarsen,
        }
    }

    pub fn set_to_this_proc(&mut self) {
        *self = Indicator::new(Ownership::ThisProc, self.action());
    }

    pub fn set_to_other_proc(&mut self) {
        *self = Indicator::new(Ownership::OtherProc, self.action());
    }

    pub fn set_to_boundary(&mut self) {
        *self = Indicator::new(Ownership::Boundary, self.action());
    }

    pub fn set_to_refine(&mut self) {
        *self = Indicator::new(self.ownership(), Action::Refine);
    }

    pub fn set_to_coarsen(&mut self) {
        *self = Indicator::new(self.ownership(), Action::Coarsen);
    }

    pub fn set_to_unchange(&mut self) {
        *self = Indicator::new(self.ownership(), Action::None);
    }
}

impl Default for Indicator {
    fn default() -> Self {
        Indicator::new(Ownership::ThisProc, Action::None)
    }
}

impl std::fmt::Debug for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indicator").field("ownership", &self.ownership()).field("action", &self.action()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_every_combination() {
        for &ownership in &[Ownership::ThisProc, Ownership::OtherProc, Ownership::Boundary] {
            for &action in &[Action::None, Action::Refine, Action::Coarsen] {
                let indicator = Indicator::new(ownership, action);
                assert_eq!(indicator.ownership(), ownership);
                assert_eq!(indicator.action(), action);
            }
        }
    }

    #[test]
    fn setters_preserve_the_other_axis() {
        let mut indicator = Indicator::new(Ownership::ThisProc, Action::Refine);
        indicator.set_to_other_proc();
        assert_eq!(indicator.ownership(), Ownership::OtherProc);
        assert_eq!(indicator.action(), Action::Refine);

        indicator.set_to_coarsen();
        assert_eq!(indicator.ownership(), Ownership::OtherProc);
        assert_eq!(indicator.action(), Action::Coarsen);
    }
}
