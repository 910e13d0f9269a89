// Include the generated protobuf code
pub mod gnmi {
    tonic::include_proto!("gnmi");
}

pub mod telemetry {
    tonic::include_proto!("telemetry");
}

pub mod mdt_dialin {
    tonic::include_proto!("mdt_dialin");
}

// Re-export the types the rest of the crate touches most often
pub use self::gnmi::{
    g_nmi_client::GNmiClient, subscribe_request, subscribe_response, typed_value, GetRequest,
    GetResponse, Notification, Path, PathElem, SubscribeRequest, SubscribeResponse, Subscription,
    SubscriptionList, TypedValue, Update,
};
pub use self::mdt_dialin::{
    g_rpc_config_oper_client::GRpcConfigOperClient, CreateSubsArgs, CreateSubsReply,
};
pub use self::telemetry::{Telemetry, TelemetryField};
