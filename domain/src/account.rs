//! Accounts: password and Google sign-in, refresh-token bookkeeping, and
//! admin user management.

use std::sync::Arc;

use crate::service::{Actor, ServiceContext};
use crate::validate::{validate_media_url, validate_name, validate_password};
use crate::{CoreError, ListResult, PasswordHasher, Role, User, UserEmail, UserRepository};

/// Identity asserted by a verified Google ID token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoogleProfile {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar_url: Option<Option<String>>,
}

pub struct AccountService<R: ?Sized> {
    ctx: ServiceContext<R>,
    hasher: Arc<dyn PasswordHasher>,
    admin_emails: Vec<UserEmail>,
}

impl<R> AccountService<R>
where
    R: UserRepository + ?Sized,
{
    /// `admin_emails` are promoted to admin when they first register.
    pub fn new(
        ctx: ServiceContext<R>,
        hasher: Arc<dyn PasswordHasher>,
        admin_emails: Vec<UserEmail>,
    ) -> Self {
        Self {
            ctx,
            hasher,
            admin_emails,
        }
    }

    fn initial_role(&self, email: &UserEmail) -> Role {
        if self.admin_emails.contains(email) {
            Role::Admin
        } else {
            Role::Customer
        }
    }

    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User, CoreError> {
        let name = validate_name("name", name)?;
        let email = UserEmail::new(email)?;
        validate_password(password)?;
        if self.ctx.repo.get_user_by_email(&email)?.is_some() {
            return Err(CoreError::AlreadyExists);
        }
        let mut user = User::new(self.ctx.next_id(), name, email, self.ctx.now());
        user.role = self.initial_role(&user.email);
        user.password_hash = Some(self.hasher.hash(password)?);
        self.ctx.repo.insert_user(user.clone())?;
        Ok(user)
    }

    /// Password login. Unknown emails and wrong passwords are indistinguishable.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, CoreError> {
        let email = UserEmail::new(email).map_err(|_| CoreError::Unauthorized)?;
        let user = self
            .ctx
            .repo
            .get_user_by_email(&email)?
            .ok_or(CoreError::Unauthorized)?;
        let ok = user
            .password_hash
            .as_deref()
            .is_some_and(|h| self.hasher.verify(password, h));
        if !ok {
            return Err(CoreError::Unauthorized);
        }
        if user.is_blocked {
            return Err(CoreError::Forbidden);
        }
        Ok(user)
    }

    /// Find the account for a Google identity: by subject first, then by
    /// email (linking the subject), otherwise create one.
    pub fn sign_in_with_google(&self, profile: GoogleProfile) -> Result<User, CoreError> {
        let repo = &self.ctx.repo;
        if let Some(user) = repo.get_user_by_google_sub(&profile.subject)? {
            if user.is_blocked {
                return Err(CoreError::Forbidden);
            }
            return Ok(user);
        }

        let email = UserEmail::new(profile.email.as_str())?;
        if let Some(mut user) = repo.get_user_by_email(&email)? {
            if user.is_blocked {
                return Err(CoreError::Forbidden);
            }
            user.google_sub = Some(profile.subject);
            if user.avatar_url.is_none() {
                user.avatar_url = profile.picture;
            }
            user.updated_at = Some(self.ctx.now());
            repo.update_user(&user)?;
            return Ok(user);
        }

        let name = profile
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.as_str().split('@').next().unwrap_or_default().to_string());
        let mut user = User::new(self.ctx.next_id(), name, email, self.ctx.now());
        user.role = self.initial_role(&user.email);
        user.google_sub = Some(profile.subject);
        user.avatar_url = profile.picture;
        repo.insert_user(user.clone())?;
        Ok(user)
    }

    pub fn get(&self, user_id: &str) -> Result<User, CoreError> {
        self.ctx.repo.get_user(user_id)?.ok_or(CoreError::NotFound)
    }

    pub fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, CoreError> {
        self.ctx.repo.get_user_by_email(email)
    }

    pub fn update_profile(&self, user_id: &str, patch: ProfilePatch) -> Result<User, CoreError> {
        let mut user = self.get(user_id)?;
        if let Some(name) = patch.name {
            user.name = validate_name("name", &name)?;
        }
        if let Some(avatar) = patch.avatar_url {
            if let Some(url) = &avatar {
                validate_media_url(url)?;
            }
            user.avatar_url = avatar;
        }
        user.updated_at = Some(self.ctx.now());
        self.ctx.repo.update_user(&user)?;
        Ok(user)
    }

    /// Change or set a password. Accounts that already have one must prove it.
    pub fn change_password(
        &self,
        user_id: &str,
        current: Option<&str>,
        new_password: &str,
    ) -> Result<(), CoreError> {
        let mut user = self.get(user_id)?;
        if let Some(hash) = user.password_hash.as_deref() {
            let ok = current.is_some_and(|c| self.hasher.verify(c, hash));
            if !ok {
                return Err(CoreError::Unauthorized);
            }
        }
        validate_password(new_password)?;
        user.password_hash = Some(self.hasher.hash(new_password)?);
        // Existing sessions must log in again.
        user.refresh_token = None;
        user.updated_at = Some(self.ctx.now());
        self.ctx.repo.update_user(&user)
    }

    /// Record `token` as the user's only valid refresh token.
    pub fn store_refresh_token(&self, user_id: &str, token: &str) -> Result<(), CoreError> {
        let mut user = self.get(user_id)?;
        user.refresh_token = Some(token.to_string());
        self.ctx.repo.update_user(&user)
    }

    pub fn clear_refresh_token(&self, user_id: &str) -> Result<(), CoreError> {
        let mut user = self.get(user_id)?;
        if user.refresh_token.take().is_some() {
            self.ctx.repo.update_user(&user)?;
        }
        Ok(())
    }

    /// Check a presented refresh token against the stored one.
    pub fn verify_refresh_token(&self, user_id: &str, token: &str) -> Result<User, CoreError> {
        let user = self
            .ctx
            .repo
            .get_user(user_id)?
            .ok_or(CoreError::Unauthorized)?;
        if user.refresh_token.as_deref() != Some(token) {
            return Err(CoreError::Unauthorized);
        }
        if user.is_blocked {
            return Err(CoreError::Forbidden);
        }
        Ok(user)
    }

    pub fn list_users(
        &self,
        actor: &Actor,
        limit: usize,
        offset: usize,
    ) -> Result<ListResult<User>, CoreError> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden);
        }
        self.ctx.repo.list_users(limit, offset)
    }

    pub fn set_role(&self, actor: &Actor, user_id: &str, role: Role) -> Result<User, CoreError> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden);
        }
        if actor.user_id == user_id && role != Role::Admin {
            return Err(CoreError::Conflict("admins cannot demote themselves".into()));
        }
        let mut user = self.get(user_id)?;
        user.role = role;
        user.updated_at = Some(self.ctx.now());
        self.ctx.repo.update_user(&user)?;
        Ok(user)
    }

    /// Block or unblock an account. Blocking also revokes its refresh token.
    pub fn set_blocked(
        &self,
        actor: &Actor,
        user_id: &str,
        blocked: bool,
    ) -> Result<User, CoreError> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden);
        }
        if actor.user_id == user_id && blocked {
            return Err(CoreError::Conflict("admins cannot block themselves".into()));
        }
        let mut user = self.get(user_id)?;
        user.is_blocked = blocked;
        if blocked {
            user.refresh_token = None;
        }
        user.updated_at = Some(self.ctx.now());
        self.ctx.repo.update_user(&user)?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryStore;
    use crate::service::fixtures::{self, PlainHasher};

    fn service() -> AccountService<InMemoryStore> {
        AccountService::new(
            fixtures::context(),
            Arc::new(PlainHasher),
            vec![UserEmail::new("boss@shop.vn").unwrap()],
        )
    }

    fn google(sub: &str, email: &str) -> GoogleProfile {
        GoogleProfile {
            subject: sub.to_string(),
            email: email.to_string(),
            name: Some("Mai Anh".into()),
            picture: Some("https://lh3.googleusercontent.com/a".into()),
        }
    }

    #[test]
    fn register_then_authenticate() {
        let svc = service();
        let user = svc.register("Lan", "Lan@Mail.com", "secret123").unwrap();
        assert_eq!(user.role, Role::Customer);
        assert_eq!(user.email.as_str(), "lan@mail.com");

        let again = svc.authenticate("lan@mail.com", "secret123").unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(
            svc.authenticate("lan@mail.com", "wrong-pass"),
            Err(CoreError::Unauthorized)
        );
        assert_eq!(
            svc.authenticate("nobody@mail.com", "secret123"),
            Err(CoreError::Unauthorized)
        );
    }

    #[test]
    fn register_rejects_duplicates_and_short_passwords() {
        let svc = service();
        svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        assert_eq!(
            svc.register("Lan 2", "LAN@mail.com", "secret123"),
            Err(CoreError::AlreadyExists)
        );
        assert!(matches!(
            svc.register("Hoa", "hoa@mail.com", "short"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn bootstrap_admin_email_gets_admin_role() {
        let svc = service();
        let boss = svc.register("Boss", "boss@shop.vn", "secret123").unwrap();
        assert_eq!(boss.role, Role::Admin);
    }

    #[test]
    fn blocked_users_cannot_sign_in() {
        let svc = service();
        let admin = svc.register("Boss", "boss@shop.vn", "secret123").unwrap();
        let user = svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        let actor = Actor::new(admin.id.clone(), admin.role);
        svc.set_blocked(&actor, &user.id, true).unwrap();
        assert_eq!(
            svc.authenticate("lan@mail.com", "secret123"),
            Err(CoreError::Forbidden)
        );
        assert!(matches!(
            svc.set_blocked(&actor, &admin.id, true),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn google_sign_in_links_existing_email() {
        let svc = service();
        let user = svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        let linked = svc.sign_in_with_google(google("g-1", "LAN@mail.com")).unwrap();
        assert_eq!(linked.id, user.id);
        assert_eq!(linked.google_sub.as_deref(), Some("g-1"));
        assert!(linked.avatar_url.is_some());

        // Subject lookup wins even if the email later changes at Google.
        let again = svc.sign_in_with_google(google("g-1", "other@mail.com")).unwrap();
        assert_eq!(again.id, user.id);
    }

    #[test]
    fn google_sign_in_creates_account_without_password() {
        let svc = service();
        let user = svc.sign_in_with_google(google("g-2", "mai@mail.com")).unwrap();
        assert_eq!(user.name, "Mai Anh");
        assert!(user.password_hash.is_none());
        assert_eq!(
            svc.authenticate("mai@mail.com", "anything1"),
            Err(CoreError::Unauthorized)
        );
        // A Google-only account may set a first password without a current one.
        svc.change_password(&user.id, None, "newsecret1").unwrap();
        assert!(svc.authenticate("mai@mail.com", "newsecret1").is_ok());
    }

    #[test]
    fn refresh_token_is_single_and_rotates() {
        let svc = service();
        let user = svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        svc.store_refresh_token(&user.id, "r1").unwrap();
        assert!(svc.verify_refresh_token(&user.id, "r1").is_ok());
        svc.store_refresh_token(&user.id, "r2").unwrap();
        assert_eq!(
            svc.verify_refresh_token(&user.id, "r1"),
            Err(CoreError::Unauthorized)
        );
        svc.clear_refresh_token(&user.id).unwrap();
        assert_eq!(
            svc.verify_refresh_token(&user.id, "r2"),
            Err(CoreError::Unauthorized)
        );
    }

    #[test]
    fn change_password_requires_current_and_revokes_sessions() {
        let svc = service();
        let user = svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        svc.store_refresh_token(&user.id, "r1").unwrap();
        assert_eq!(
            svc.change_password(&user.id, Some("nope"), "another123"),
            Err(CoreError::Unauthorized)
        );
        svc.change_password(&user.id, Some("secret123"), "another123")
            .unwrap();
        assert!(svc.authenticate("lan@mail.com", "another123").is_ok());
        assert_eq!(svc.get(&user.id).unwrap().refresh_token, None);
    }

    #[test]
    fn only_admins_manage_roles() {
        let svc = service();
        let admin = svc.register("Boss", "boss@shop.vn", "secret123").unwrap();
        let user = svc.register("Lan", "lan@mail.com", "secret123").unwrap();
        let as_user = Actor::new(user.id.clone(), user.role);
        assert_eq!(
            svc.set_role(&as_user, &user.id, Role::Admin),
            Err(CoreError::Forbidden)
        );
        let as_admin = Actor::new(admin.id.clone(), admin.role);
        let promoted = svc.set_role(&as_admin, &user.id, Role::Consultant).unwrap();
        assert_eq!(promoted.role, Role::Consultant);
        assert!(matches!(
            svc.set_role(&as_admin, &admin.id, Role::Customer),
            Err(CoreError::Conflict(_))
        ));
        assert_eq!(svc.list_users(&as_admin, 10, 0).unwrap().total, 2);
    }
}
