use anyhow::Result;
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::Drawable,
    Connection,
};

use super::InputSource;

pub struct X11InputSource {
    connection: Connection,
    preferred_screen: i32,
}

impl X11InputSource {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        Ok(Self {
            connection,
            preferred_screen,
        })
    }
}

impl InputSource for X11InputSource {
    #[instrument(skip(self))]
    fn ms_since_input(&mut self) -> Result<u32> {
        let setup = self.connection.get_setup();

        // Currently the application only supports 1 x11 screen.
        let root = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .unwrap()
            .root();
        let cookie = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(cookie)?;
        Ok(reply.ms_since_user_input())
    }
}
