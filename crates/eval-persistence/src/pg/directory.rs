//! Directorio de usuarios y diccionario de fail codes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use eval_core::store::{FailCodeStore, StoreResult, UserDirectory};
use eval_domain::{FailCode, NewFailCode, NewUser, Role, User, UserId};

use super::{ConnectionProvider, PgStore};
use crate::error::PersistenceError;
use crate::models::{FailCodeChanges, FailCodeRow, NewFailCodeRow, NewUserRow, UserRow};
use crate::schema::{fail_codes, users};

impl<P: ConnectionProvider> UserDirectory for PgStore<P> {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read(|conn| {
                   users::table.find(id)
                               .select(UserRow::as_select())
                               .first::<UserRow>(conn)
                               .optional()?
                               .map(UserRow::into_domain)
                               .transpose()
               })?)
    }

    fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.read(|conn| {
                   users::table.filter(users::username.eq(username))
                               .select(UserRow::as_select())
                               .first::<UserRow>(conn)
                               .optional()?
                               .map(UserRow::into_domain)
                               .transpose()
               })?)
    }

    fn active_with_role(&self, role: Role) -> StoreResult<Vec<User>> {
        Ok(self.read(|conn| {
                   users::table.filter(users::role.eq(role.as_str()).and(users::is_active.eq(true)))
                               .order(users::id.asc())
                               .select(UserRow::as_select())
                               .load::<UserRow>(conn)?
                               .into_iter()
                               .map(UserRow::into_domain)
                               .collect()
               })?)
    }

    fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        Ok(self.write(|tx| {
                   diesel::insert_into(users::table).values(NewUserRow::new(user, now))
                                                    .returning(UserRow::as_returning())
                                                    .get_result::<UserRow>(tx)?
                                                    .into_domain()
               })?)
    }

    fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        Ok(self.write(|tx| {
                   let n = diesel::update(users::table.find(id)).set(users::last_login.eq(Some(at))).execute(tx)?;
                   if n == 0 {
                       return Err(PersistenceError::NotFound);
                   }
                   Ok(())
               })?)
    }

    fn set_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        Ok(self.write(|tx| {
                   diesel::update(users::table.find(id)).set(users::is_active.eq(active))
                                                        .returning(UserRow::as_returning())
                                                        .get_result::<UserRow>(tx)?
                                                        .into_domain()
               })?)
    }
}

impl<P: ConnectionProvider> FailCodeStore for PgStore<P> {
    fn find_code(&self, code: &str) -> StoreResult<Option<FailCode>> {
        Ok(self.read(|conn| {
                   Ok(fail_codes::table.filter(fail_codes::code.eq(code))
                                       .select(FailCodeRow::as_select())
                                       .first::<FailCodeRow>(conn)
                                       .optional()?
                                       .map(FailCode::from))
               })?)
    }

    /// Cada alta es su propia transacción corta; la colisión de `code` sale
    /// como `UniqueViolation` y el diccionario relee el ganador.
    fn insert_code(&self, code: &NewFailCode, now: DateTime<Utc>) -> StoreResult<FailCode> {
        Ok(self.write(|tx| {
                   Ok(diesel::insert_into(fail_codes::table).values(NewFailCodeRow::new(code, now))
                                                            .returning(FailCodeRow::as_returning())
                                                            .get_result::<FailCodeRow>(tx)?
                                                            .into())
               })?)
    }

    fn update_code(&self, code: &FailCode) -> StoreResult<FailCode> {
        let changes = FailCodeChanges { short_name: code.short_name.as_deref(),
                                        description: code.description.as_deref(),
                                        is_provisional: code.is_provisional,
                                        source: code.source.as_deref(),
                                        updated_at: code.updated_at };
        Ok(self.write(|tx| {
                   Ok(diesel::update(fail_codes::table.filter(fail_codes::id.eq(code.id)
                                                                            .and(fail_codes::code.eq(&code.code))))
                       .set(&changes)
                       .returning(FailCodeRow::as_returning())
                       .get_result::<FailCodeRow>(tx)?
                       .into())
               })?)
    }

    fn list_codes(&self, provisional_only: bool) -> StoreResult<Vec<FailCode>> {
        Ok(self.read(|conn| {
                   let mut query = fail_codes::table.select(FailCodeRow::as_select()).into_boxed();
                   if provisional_only {
                       query = query.filter(fail_codes::is_provisional.eq(true));
                   }
                   Ok(query.order(fail_codes::code.asc())
                           .load::<FailCodeRow>(conn)?
                           .into_iter()
                           .map(FailCode::from)
                           .collect())
               })?)
    }
}
