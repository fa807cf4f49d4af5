#![allow(missing_docs)]

use axum_test::TestServer;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, build_router,
    auth::encode_jwt,
    user::{Role, User, get_user_by_id, set_role, test_utils},
};

/// A test server over an in-memory database, plus the state behind it.
pub(crate) struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(
            Connection::open_in_memory().expect("Could not open database in memory."),
            "foobar",
            Duration::minutes(15),
        )
        .expect("Could not create app state.");
        let server =
            TestServer::try_new(build_router(state.clone())).expect("Could not create test server.");

        Self { server, state }
    }

    pub fn insert_user(&self, username: &str) -> User {
        let connection = self.state.db_connection.lock().unwrap();

        test_utils::insert_user(username, &connection)
    }

    pub fn token_for(&self, user: &User) -> String {
        encode_jwt(
            user.id,
            &user.email,
            OffsetDateTime::now_utc(),
            self.state.token_duration,
            &self.state.jwt_keys.encoding_key,
        )
        .unwrap()
    }
}

pub(crate) fn insert_admin(app: &TestApp) -> User {
    let user = app.insert_user("admin");
    let connection = app.state.db_connection.lock().unwrap();
    set_role(&user.email, Role::Admin, &connection).unwrap();

    get_user_by_id(user.id, &connection).unwrap()
}
