pub mod server;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
}
