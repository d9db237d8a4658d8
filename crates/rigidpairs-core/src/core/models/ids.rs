use slotmap::new_key_type;

new_key_type! {
    pub struct ParticleId;
    pub struct RigidBodyId;
    pub struct RefinerId;
}

/// An unordered candidate pair as emitted by the close-pair finders.
pub type ParticlePair = (ParticleId, ParticleId);

/// Returns the pair with its smaller id first.
#[inline]
pub fn canonical_pair(a: ParticleId, b: ParticleId) -> ParticlePair {
    if a <= b { (a, b) } else { (b, a) }
}
