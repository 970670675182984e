use sea_orm::entity::prelude::*;

use crate::db::IDType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ticket_categories")]
pub struct Model {
    /// Identifiant dans la base de données
    #[sea_orm(primary_key)]
    pub id: i32,
    pub guild_id: IDType,
    /// Nom interne de la catégorie, toujours en minuscules
    ///
    /// Il est unique par serveur et sert de préfixe au nom des salons de tickets.
    pub name: String,
    /// Libellé affiché dans le menu du panel
    pub label: String,
    pub description: Option<String>,
    /// Emoji unicode ou identifiant d'un emoji personnalisé
    pub emoji: Option<String>,
    pub display_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation
{}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    /// Valeur de l'option du menu de sélection associée à cette catégorie
    pub fn option_value(&self) -> String {
        format!("cat_{}", self.id)
    }
    /// Retrouve l'identifiant d'une catégorie à partir de la valeur d'une option
    pub fn parse_option_value(value: &str) -> Option<i32> {
        value.strip_prefix("cat_")?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Model;

    #[test]
    fn option_value() {
        assert_eq!(Model::parse_option_value("cat_12"), Some(12));
        assert_eq!(Model::parse_option_value("cat_"), None);
        assert_eq!(Model::parse_option_value("suporte"), None);
        assert_eq!(Model::parse_option_value("cat_x1"), None);
    }
}
