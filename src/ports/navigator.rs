//! Login Navigator Port - Surrounding Application Boundary
//!
//! The gateway asks the surrounding application to show its login
//! surface when the backend rejects the session. Rendering and routing
//! live outside this crate; only this trait crosses the boundary.

/// Navigation hooks into the surrounding application.
pub trait LoginNavigator: Send + Sync + 'static {
  /// Whether the user is already looking at the login surface.
  fn is_on_login_surface(&self) -> bool;

  /// Ask the application to show the login surface.
  fn navigate_to_login(&self);
}
