pub mod guild;
pub mod ticket;
pub mod archive;
pub mod rating;

pub use guild::Entity as GuildConfig;
pub use guild::staff_role::Entity as StaffRole;
pub use ticket::Entity as Ticket;
pub use ticket::category::Entity as TicketCategory;
pub use ticket::panel::Entity as Panel;
pub use ticket::log::Entity as TicketLog;
pub use archive::Entity as Transcript;
pub use rating::Entity as Rating;
