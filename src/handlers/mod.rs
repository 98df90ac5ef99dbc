// handlers/mod.rs - two-tier handler layout
//
// public: reachable without a token (register, login).
// protected: everything under /api/* behind JWT authentication; admin
// endpoints live here too, gated by policy rather than a separate tier.
pub mod protected;
pub mod public;
