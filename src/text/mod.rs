pub mod corrector;
pub mod rules;
