#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInvite {
    pub channel_name: String,
    pub link: Option<String>,
}
