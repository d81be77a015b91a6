pub mod handler;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod throttle;

pub use handler::*;
pub use identity::*;
pub use jwt::*;
pub use middleware::*;
pub use throttle::*;
