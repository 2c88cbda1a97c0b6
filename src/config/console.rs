//! A minimal seam for cipher-selection prompts. Interactive console UX is a
//! Non-goal of this crate; this trait exists only so a caller embedding this
//! crate (a CLI, a FUSE adapter) can supply its own prompting without the
//! core depending on any particular terminal library.

use anyhow::Result;

use super::cipher_registry::CipherId;

pub trait Console {
    /// Ask the user to pick a cipher from the closed set, warning about any
    /// flagged as weak (§4.6 "Creation contract").
    fn ask_cipher(&self, choices: &[CipherId]) -> Result<CipherId>;

    /// Ask for confirmation before proceeding with a cipher flagged weak.
    fn confirm_weak_cipher(&self, cipher: CipherId) -> Result<bool>;
}

/// Non-interactive [Console] that always picks the first (strongest) choice
/// and refuses to confirm a weak cipher. Used by default and in tests.
pub struct NonInteractiveConsole;

impl Console for NonInteractiveConsole {
    fn ask_cipher(&self, choices: &[CipherId]) -> Result<CipherId> {
        choices
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no cipher choices available"))
    }

    fn confirm_weak_cipher(&self, _cipher: CipherId) -> Result<bool> {
        Ok(false)
    }
}
