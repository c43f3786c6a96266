//! Fixed Ristretto generators.
//!
//! Each generator is derived by hashing a public label to the group, so nobody
//! knows a discrete logarithm relation between any two of them.

use curve25519_dalek::ristretto::RistrettoPoint;
use once_cell::sync::Lazy;
use sha2::Sha512;

/// The generators used by MACs, attributes, presentations and proofs.
#[derive(Clone, Debug)]
pub struct Generators {
    /// MAC key generator.
    pub gw: RistrettoPoint,
    /// Blinding generator for the `w` commitment.
    pub gwp: RistrettoPoint,
    /// Generator for the `x0` key component.
    pub gx0: RistrettoPoint,
    /// Generator for the `x1` key component.
    pub gx1: RistrettoPoint,
    /// Generator for the MAC value `V`.
    pub gv: RistrettoPoint,
    /// Value generator of attribute commitments.
    pub gg: RistrettoPoint,
    /// Randomness generator of attribute commitments.
    pub gh: RistrettoPoint,
    /// Generator for the attribute key component `ya`.
    pub ga: RistrettoPoint,
    /// Serial number generator.
    pub gs: RistrettoPoint,
}

/// The process-wide generator set.
pub static GENERATORS: Lazy<Generators> = Lazy::new(|| Generators {
    gw: hash_to_group(b"Gw"),
    gwp: hash_to_group(b"Gwp"),
    gx0: hash_to_group(b"Gx0"),
    gx1: hash_to_group(b"Gx1"),
    gv: hash_to_group(b"GV"),
    gg: hash_to_group(b"Gg"),
    gh: hash_to_group(b"Gh"),
    ga: hash_to_group(b"Ga"),
    gs: hash_to_group(b"Gs"),
});

fn hash_to_group(label: &[u8]) -> RistrettoPoint {
    let mut input = b"WabiSabi generator ".to_vec();
    input.extend_from_slice(label);

    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}

/// Returns the MAC point `U = H(t)`.
pub(crate) fn hash_to_u(t_bytes: &[u8; 32]) -> RistrettoPoint {
    let mut input = b"WabiSabi MAC U ".to_vec();
    input.extend_from_slice(t_bytes);

    RistrettoPoint::hash_from_bytes::<Sha512>(&input)
}
