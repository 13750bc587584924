/// implemented by #[derive(Id)]
pub trait Id {
    fn id(&self) -> &str;
}
