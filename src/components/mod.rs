//! Module comportant les composants

pub mod tickets;

// Fonctions utiles pour les composants
pub mod utils;
