// Codigo generado por tonic-build a partir de proto/payment.proto
pub mod payment {
    tonic::include_proto!("payment");
}
