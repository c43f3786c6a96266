//! The statements proven by clients and issuers.
//!
//! Clients and issuers build the same statements from public data; only the
//! `*_knowledge` constructors need secrets.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::Identity};

use crate::{
    proof_system::{Equation, Knowledge, Statement},
    CredentialIssuerParameters, CredentialIssuerSecretKey, CredentialPresentation, Mac,
    GENERATORS,
};

/// The issuer knows the secret key behind its parameters, and used it for `mac`.
///
/// Witness: `[w, w', x0, x1, ya]`.
pub(crate) fn issuer_parameters_statement(
    parameters: &CredentialIssuerParameters,
    mac: &Mac,
    ma: &RistrettoPoint,
) -> Statement {
    let g = &*GENERATORS;
    let o = RistrettoPoint::identity();
    let u = mac.u();

    Statement::new(vec![
        // Cw = w·Gw + w'·Gwp
        Equation::new(parameters.cw, vec![g.gw, g.gwp, o, o, o]),
        // GV − I = x0·Gx0 + x1·Gx1 + ya·Ga
        Equation::new(g.gv - parameters.i, vec![o, o, g.gx0, g.gx1, g.ga]),
        // V = w·Gw + x0·U + x1·t·U + ya·Ma
        Equation::new(mac.v, vec![g.gw, o, u, mac.t * u, *ma]),
    ])
}

pub(crate) fn issuer_parameters_knowledge(
    parameters: &CredentialIssuerParameters,
    mac: &Mac,
    ma: &RistrettoPoint,
    sk: &CredentialIssuerSecretKey,
) -> Knowledge {
    Knowledge::new(
        issuer_parameters_statement(parameters, mac, ma),
        vec![sk.w, sk.wp, sk.x0, sk.x1, sk.ya],
    )
}

/// The presented credential has a valid MAC, and its serial number matches its
/// randomness.
///
/// `z` is the issuer's recomputation `CV − (w·Gw + x0·Cx0 + x1·Cx1 + ya·Ca)`,
/// which equals `z·I` for honest presentations.
///
/// Witness: `[z, −t·z, t, a, r]`.
pub(crate) fn show_credential_statement(
    presentation: &CredentialPresentation,
    z: RistrettoPoint,
    parameters: &CredentialIssuerParameters,
) -> Statement {
    let g = &*GENERATORS;
    let o = RistrettoPoint::identity();

    Statement::new(vec![
        // Z = z·I
        Equation::new(z, vec![parameters.i, o, o, o, o]),
        // Cx1 = z·Gx1 + z0·Gx0 + t·Cx0
        Equation::new(
            presentation.cx1,
            vec![g.gx1, g.gx0, presentation.cx0, o, o],
        ),
        // Ca = z·Ga + a·Gg + r·Gh
        Equation::new(presentation.ca, vec![g.ga, o, o, g.gg, g.gh]),
        // S = r·Gs
        Equation::new(presentation.s, vec![o, o, o, o, g.gs]),
    ])
}

pub(crate) fn show_credential_knowledge(
    presentation: &CredentialPresentation,
    z: Scalar,
    t: Scalar,
    value: u64,
    randomness: Scalar,
    parameters: &CredentialIssuerParameters,
) -> Knowledge {
    Knowledge::new(
        show_credential_statement(presentation, z * parameters.i, parameters),
        vec![z, -(t * z), t, Scalar::from(value), randomness],
    )
}

/// The requested attribute commits to zero: `Ma = r·Gh`.
pub(crate) fn zero_statement(ma: &RistrettoPoint) -> Statement {
    Statement::new(vec![Equation::new(*ma, vec![GENERATORS.gh])])
}

pub(crate) fn zero_knowledge(ma: &RistrettoPoint, randomness: Scalar) -> Knowledge {
    Knowledge::new(zero_statement(ma), vec![randomness])
}

/// The requested attribute commits to a value in `[0, 2^width)`, where `width`
/// is the number of bit commitments.
///
/// Witness: `[r_delta, b_0, r_0, p_0, b_1, r_1, p_1, ...]`, where
/// `B_j = b_j·Gg + r_j·Gh`, `r_delta = r − Σ 2^j·r_j` and `p_j = −b_j·r_j`.
/// The last equation of each bit forces `b_j·(b_j − 1) = 0`.
pub(crate) fn range_proof_statement(
    ma: &RistrettoPoint,
    bit_commitments: &[RistrettoPoint],
) -> Statement {
    let g = &*GENERATORS;
    let o = RistrettoPoint::identity();
    let witness_len = 1 + 3 * bit_commitments.len();

    let weighted_bits: RistrettoPoint = bit_commitments
        .iter()
        .enumerate()
        .map(|(j, b)| Scalar::from(1u64 << j) * b)
        .sum();

    // Ma − Σ 2^j·B_j = r_delta·Gh
    let mut generators = vec![o; witness_len];
    generators[0] = g.gh;
    let mut equations = vec![Equation::new(ma - weighted_bits, generators)];

    for (j, bit_commitment) in bit_commitments.iter().enumerate() {
        let bit = 1 + 3 * j;
        let randomness = bit + 1;
        let product = bit + 2;

        // B_j = b_j·Gg + r_j·Gh
        let mut generators = vec![o; witness_len];
        generators[bit] = g.gg;
        generators[randomness] = g.gh;
        equations.push(Equation::new(*bit_commitment, generators));

        // O = b_j·(B_j − Gg) + p_j·Gh
        let mut generators = vec![o; witness_len];
        generators[bit] = bit_commitment - g.gg;
        generators[product] = g.gh;
        equations.push(Equation::new(o, generators));
    }

    Statement::new(equations)
}

/// Builds bit commitments for `value` and the matching range proof knowledge.
///
/// # Panics
///
/// If `value` doesn't fit in `width` bits.
pub(crate) fn range_proof_knowledge<R: rand_core::RngCore + rand_core::CryptoRng>(
    ma: &RistrettoPoint,
    value: u64,
    randomness: Scalar,
    width: usize,
    rng: &mut R,
) -> (Vec<RistrettoPoint>, Knowledge) {
    assert!(
        width >= 64 || value < (1u64 << width),
        "requested values are checked against the issuer maximum",
    );

    let g = &*GENERATORS;
    let mut bit_commitments = Vec::with_capacity(width);
    let mut witness = vec![Scalar::ZERO];
    let mut r_delta = randomness;

    for j in 0..width {
        let b = Scalar::from((value >> j) & 1);
        let r = Scalar::random(rng);

        bit_commitments.push(b * g.gg + r * g.gh);
        r_delta -= Scalar::from(1u64 << j) * r;
        witness.extend([b, r, -(b * r)]);
    }
    witness[0] = r_delta;

    let statement = range_proof_statement(ma, &bit_commitments);

    (bit_commitments, Knowledge::new(statement, witness))
}

/// The presented and requested values differ by `delta`.
///
/// Witness: `[Σ z, Σ r_presented − Σ r_requested]`.
pub(crate) fn balance_statement(balance_commitment: RistrettoPoint) -> Statement {
    let g = &*GENERATORS;

    Statement::new(vec![Equation::new(balance_commitment, vec![g.ga, g.gh])])
}

/// Computes `Σ Ca − Σ Ma − delta·Gg`.
pub(crate) fn balance_commitment(
    delta: i64,
    presented: &[CredentialPresentation],
    requested: &[RistrettoPoint],
) -> RistrettoPoint {
    let presented_sum: RistrettoPoint = presented.iter().map(|p| p.ca).sum();
    let requested_sum: RistrettoPoint = requested.iter().sum();

    presented_sum - requested_sum - signed_scalar(delta) * GENERATORS.gg
}

pub(crate) fn balance_knowledge(
    balance_commitment: RistrettoPoint,
    z_sum: Scalar,
    randomness_delta: Scalar,
) -> Knowledge {
    Knowledge::new(
        balance_statement(balance_commitment),
        vec![z_sum, randomness_delta],
    )
}

/// Converts a signed value to a scalar, mapping negative values to their
/// additive inverses.
pub(crate) fn signed_scalar(value: i64) -> Scalar {
    let magnitude = Scalar::from(value.unsigned_abs());

    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}
