//! Fonctions d'accès aux tables.
//!
//! Ces fonctions ne connaissent pas le cache: elles lisent et écrivent toujours la base.

pub mod guild;
pub mod staff;
pub mod ticket;
pub mod panel;
pub mod rating;
pub mod management;

use std::fmt;

#[derive(Debug)]
pub enum Error {
    SeaORM(sea_orm::DbErr),
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SeaORM(e) => write!(f, "base de données: {}", e),
            Error::Custom(e) => f.write_str(e),
        }
    }
}

impl std::error::Error for Error {}

impl From<sea_orm::DbErr> for Error {
    fn from(err: sea_orm::DbErr) -> Self {
        Error::SeaORM(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
