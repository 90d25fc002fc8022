pub mod geo;

pub use geo::GeoLocator;

use std::net::IpAddr;

/// Maps a responder address to human-readable location text
///
/// Both lookups return an empty string when nothing is known.
pub trait Locator: Send + Sync {
    /// Location text, e.g. `"Japan Tokyo Example Net(AS64500)"`
    fn locate(&self, ip: IpAddr) -> String;

    /// Registered country of the address block
    fn registration(&self, ip: IpAddr) -> String;
}

/// Locator used when lookups are disabled or no database is available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocator;

impl Locator for NoLocator {
    fn locate(&self, _ip: IpAddr) -> String {
        String::new()
    }

    fn registration(&self, _ip: IpAddr) -> String {
        String::new()
    }
}

impl<L: Locator + ?Sized> Locator for Box<L> {
    fn locate(&self, ip: IpAddr) -> String {
        (**self).locate(ip)
    }

    fn registration(&self, ip: IpAddr) -> String {
        (**self).registration(ip)
    }
}

/// Sanitize a string for safe terminal display by removing control characters.
///
/// Database strings end up on a raw terminal, so escape sequences must not
/// survive.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}
