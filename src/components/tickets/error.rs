use std::fmt;

use crate::db::controller;
use super::platform::PlatformError;

/// Résultat d'une opération sur un ticket.
///
/// Les refus ([`TicketError::is_rejection`]) sont renvoyés tels quels à l'utilisateur,
/// sans aucune modification d'état. Les autres erreurs viennent d'une dépendance.
#[derive(Debug)]
pub enum TicketError {
    TooFast,
    AlreadyOpen,
    PanelNotFound,
    CategoryNotFound,
    NoParentCategory,
    ParentCategoryInvalid,
    CategoryFull,
    BotMissingPermissions,
    NotATicket,
    NotStaff,
    NotAllowedToClose,
    TicketNotOpen,
    AlreadyClosed,
    AlreadyDeleted,
    BadConfirmation,
    NoCategories,
    CategoryExists,
    PanelExists,

    Store(controller::Error),
    Platform(PlatformError),
    /// Le salon existe mais le ticket n'a pas pu être enregistré
    Orphaned { channel: u64 },
    Transcript(String),
}

impl TicketError {
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            TicketError::Store(_) | TicketError::Platform(_) | TicketError::Orphaned { .. } | TicketError::Transcript(_)
        )
    }
}

impl fmt::Display for TicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TicketError::*;
        match self {
            TooFast => f.write_str("Vous allez trop vite, réessayez dans quelques secondes."),
            AlreadyOpen => f.write_str("Vous avez déjà un ticket ouvert sur ce serveur."),
            PanelNotFound => f.write_str("Ce panel n'existe plus."),
            CategoryNotFound => f.write_str("Cette catégorie n'existe plus."),
            NoParentCategory => f.write_str("Aucune catégorie Discord n'est configurée pour les tickets."),
            ParentCategoryInvalid => f.write_str("La catégorie Discord des tickets est introuvable."),
            CategoryFull => f.write_str("La catégorie des tickets est pleine, réessayez plus tard."),
            BotMissingPermissions => f.write_str("Le bot n'a pas la permission de gérer les salons et les rôles."),
            NotATicket => f.write_str("Ce salon n'est pas un ticket."),
            NotStaff => f.write_str("Seule l'équipe peut effectuer cette action."),
            NotAllowedToClose => f.write_str("Vous n'avez pas la permission de fermer ce ticket."),
            TicketNotOpen => f.write_str("Ce ticket n'est plus ouvert."),
            AlreadyClosed => f.write_str("Ce ticket est déjà fermé."),
            AlreadyDeleted => f.write_str("Ce ticket a déjà été supprimé."),
            BadConfirmation => f.write_str("La phrase de confirmation est incorrecte."),
            NoCategories => f.write_str("Aucune catégorie de ticket n'est configurée."),
            CategoryExists => f.write_str("Une catégorie porte déjà ce nom."),
            PanelExists => f.write_str("Ce salon possède déjà un panel."),
            Store(e) => write!(f, "Erreur de la base de données, réessayez: {}", e),
            Platform(e) => write!(f, "Erreur de Discord, réessayez: {}", e),
            Orphaned { channel } => write!(f, "Le salon <#{}> a été créé mais le ticket n'a pas pu être enregistré.", channel),
            Transcript(e) => write!(f, "Impossible de générer la transcription: {}", e),
        }
    }
}

impl std::error::Error for TicketError {}

impl From<controller::Error> for TicketError {
    fn from(err: controller::Error) -> Self {
        TicketError::Store(err)
    }
}

impl From<PlatformError> for TicketError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::CategoryFull => TicketError::CategoryFull,
            e => TicketError::Platform(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;

/// Erreur du système de notation
#[derive(Debug)]
pub enum RatingError {
    OutOfRange(i32),
    TicketNotFound,
    Store(controller::Error),
}

impl fmt::Display for RatingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingError::OutOfRange(v) => write!(f, "La note doit être comprise entre 1 et 5 (reçu {}).", v),
            RatingError::TicketNotFound => f.write_str("Ce ticket n'existe plus."),
            RatingError::Store(e) => write!(f, "Erreur de la base de données, réessayez: {}", e),
        }
    }
}

impl std::error::Error for RatingError {}

impl From<controller::Error> for RatingError {
    fn from(err: controller::Error) -> Self {
        RatingError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_and_failures() {
        assert!(TicketError::AlreadyOpen.is_rejection());
        assert!(TicketError::BadConfirmation.is_rejection());
        assert!(!TicketError::Orphaned { channel: 1 }.is_rejection());
        assert!(!TicketError::Store(controller::Error::Custom("x".into())).is_rejection());
        assert!(matches!(TicketError::from(PlatformError::CategoryFull), TicketError::CategoryFull));
        assert!(matches!(TicketError::from(PlatformError::NotFound), TicketError::Platform(_)));
    }
}
