// Record processing: normalization, deduplication, rule evaluation, scoring and decision

pub mod decision;
pub mod dedupe;
pub mod normalize;
pub mod quality_gate;
pub mod scoring;
