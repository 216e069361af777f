//! Business logic services

pub mod availability;
pub mod books;
pub mod copies;
pub mod loans;
pub mod notifications;
pub mod side_effects;
pub mod users;

use crate::{config::LendingConfig, repository::Stores};

pub use side_effects::{Outcome, SideEffectWarning};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub availability: availability::AvailabilityService,
    pub books: books::BooksService,
    pub copies: copies::CopiesService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
    pub notifications: notifications::NotificationsService,
}

impl Services {
    /// Create all services over the given stores
    pub fn new(stores: Stores, lending: LendingConfig) -> Self {
        let side_effects = side_effects::SideEffects::new(
            stores.audit_logs.clone(),
            stores.notifications.clone(),
        );
        let availability =
            availability::AvailabilityService::new(stores.copies.clone(), stores.loans.clone());
        let copies = copies::CopiesService::new(
            stores.copies.clone(),
            stores.books.clone(),
            availability.clone(),
            side_effects.clone(),
            &lending,
        );

        Self {
            books: books::BooksService::new(
                stores.books.clone(),
                stores.copies.clone(),
                copies.clone(),
                availability.clone(),
                side_effects.clone(),
            ),
            loans: loans::LoansService::new(
                stores.loans.clone(),
                stores.users.clone(),
                stores.books.clone(),
                copies.clone(),
                side_effects.clone(),
                lending,
            ),
            users: users::UsersService::new(
                stores.users.clone(),
                availability.clone(),
                side_effects,
            ),
            notifications: notifications::NotificationsService::new(
                stores.notifications,
                stores.audit_logs,
            ),
            availability,
            copies,
        }
    }
}
