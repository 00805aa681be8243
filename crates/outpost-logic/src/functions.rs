//! Base functions: named capabilities a facility provides, requires or forbids.
//!
//! The vocabulary is closed: every function is one bit of [`BaseFunctions`].
//! Rule data spells sets as `"LAB_SERVICE | POWER"`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Fixed-width set of base functions.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BaseFunctions: u32 {
        const ACCESS = 1 << 0;
        const COMMAND = 1 << 1;
        const POWER = 1 << 2;
        const LAB_SERVICE = 1 << 3;
        const WORKSHOP_SERVICE = 1 << 4;
        const HANGAR_SERVICE = 1 << 5;
        const CONTAINMENT_SERVICE = 1 << 6;
        const MEDICAL = 1 << 7;
        const PSI_TRAINING = 1 << 8;
        const COMBAT_TRAINING = 1 << 9;
        const RADAR = 1 << 10;
        const HYPERWAVE = 1 << 11;
        const DEFENSE = 1 << 12;
        const SHIELDING = 1 << 13;
        const ARMORY = 1 << 14;
        const ALIEN_TECH = 1 << 15;
    }
}

impl BaseFunctions {
    /// Functions in `required` that `self` (the provided set) does not cover.
    pub fn missing(self, required: BaseFunctions) -> BaseFunctions {
        required - self
    }

    /// Whether every function in `required` is covered by `self`.
    pub fn covers(self, required: BaseFunctions) -> bool {
        self.missing(required).is_empty()
    }
}
