//! End-to-end behavior of the cache under a deterministic clock: coalesced
//! hits, adaptive limit growth and hysteretic shrinkage, demand-capped and
//! fragmentation-driven release, and conservation of borrowed pages.
