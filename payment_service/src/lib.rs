//! Payment Orchestration Service Library
//!
//! This library acts as the core of the Payment Service, exporting the necessary modules
//! for the application binary and integration tests.
//!
//! # Modules
//!
//! * `api` - Contains the API interfaces (HTTP/gRPC) and the callback/cron ingress.
//! * `domain` - Contains the domain entities, the chain state engine and business rules.
//! * `infrastructure` - Contains the concrete implementations of repositories, the
//!   gateway client and the secret resolver.
//! * `use_cases` - Contains the application business logic and workflows.
//! * `jobs` - Contains the background jobs (ACH verification sweep, pool monitor).

pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod use_cases;
