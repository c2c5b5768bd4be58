//! Screen routing and the admin gate.
//!
//! Screen identity is a closed enum; there is no "no screen" value and no
//! stringly-typed routing. The admin credential check mirrors the product's
//! static gate and carries no hard security goal.

use crate::session::DocumentSlot;

const ADMIN_USER: &str = "1234";
const ADMIN_PASS: &str = "1234";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Landing,
    Pdf,
    Downloads,
    Booker,
    PortalMagico,
    Revolucao,
    ProdutosLogin,
    AdminHome,
    Welcome,
}

impl Screen {
    pub fn all() -> &'static [Screen] {
        &[
            Screen::Landing,
            Screen::Pdf,
            Screen::Downloads,
            Screen::Booker,
            Screen::PortalMagico,
            Screen::Revolucao,
            Screen::ProdutosLogin,
            Screen::AdminHome,
            Screen::Welcome,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Screen::Landing => "landing",
            Screen::Pdf => "pdf",
            Screen::Downloads => "downloads",
            Screen::Booker => "booker",
            Screen::PortalMagico => "portal-magico",
            Screen::Revolucao => "revolucao",
            Screen::ProdutosLogin => "produtos-login",
            Screen::AdminHome => "admin-home",
            Screen::Welcome => "welcome",
        }
    }

    pub fn parse(name: &str) -> Option<Screen> {
        Screen::all().iter().copied().find(|s| s.name() == name)
    }

    /// Document that must be loaded before this screen can show.
    pub fn required_document(self) -> Option<DocumentSlot> {
        match self {
            Screen::Pdf => Some(DocumentSlot::Main),
            Screen::Booker => Some(DocumentSlot::Booker),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error("admin access required")]
    AdminRequired,
}

#[derive(Debug)]
pub struct NavState {
    active: Screen,
    admin_logged_in: bool,
    last_before_admin: Screen,
}

impl NavState {
    pub fn new() -> Self {
        Self {
            active: Screen::Landing,
            admin_logged_in: false,
            last_before_admin: Screen::Landing,
        }
    }

    pub fn active(&self) -> Screen {
        self.active
    }

    pub fn is_admin(&self) -> bool {
        self.admin_logged_in
    }

    pub fn navigate(&mut self, screen: Screen) -> Result<(), NavError> {
        if screen == Screen::AdminHome && !self.admin_logged_in {
            return Err(NavError::AdminRequired);
        }
        self.active = screen;
        Ok(())
    }

    /// Static credential gate. On success the session becomes admin and lands
    /// on the admin screen; the previous screen is remembered.
    pub fn admin_login(&mut self, user: &str, pass: &str) -> bool {
        if user == ADMIN_USER && pass == ADMIN_PASS {
            self.last_before_admin = self.active;
            self.admin_logged_in = true;
            self.active = Screen::AdminHome;
            true
        } else {
            false
        }
    }

    /// Leave the admin screen, back to wherever the user was.
    pub fn leave_admin(&mut self) {
        if self.active == Screen::AdminHome {
            self.active = self.last_before_admin;
        }
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_screen_requires_login() {
        let mut nav = NavState::new();
        assert!(matches!(
            nav.navigate(Screen::AdminHome),
            Err(NavError::AdminRequired)
        ));

        assert!(!nav.admin_login("1234", "wrong"));
        assert!(!nav.is_admin());

        assert!(nav.admin_login("1234", "1234"));
        assert!(nav.is_admin());
        assert_eq!(nav.active(), Screen::AdminHome);

        nav.leave_admin();
        assert_eq!(nav.active(), Screen::Landing);
    }

    #[test]
    fn screen_names_roundtrip() {
        for screen in Screen::all() {
            assert_eq!(Screen::parse(screen.name()), Some(*screen));
        }
        assert_eq!(Screen::parse("backstage"), None);
    }

    #[test]
    fn document_screens_declare_their_slot() {
        assert_eq!(Screen::Pdf.required_document(), Some(DocumentSlot::Main));
        assert_eq!(Screen::Booker.required_document(), Some(DocumentSlot::Booker));
        assert_eq!(Screen::Landing.required_document(), None);
    }
}
