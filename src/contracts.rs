// src/contracts.rs
use alloy::sol;

sol! {
    /// Batch termination entry point of the protocol's liquidator helper.
    interface IBatchLiquidator {
        enum FlowType {
            ConstantFlowAgreement,
            GeneralDistributionAgreement
        }

        struct FlowLiquidationData {
            FlowType agreementOperation;
            address sender;
            address receiver;
        }

        function deleteFlows(address superToken, FlowLiquidationData[] memory data) external;
    }
}

sol! {
    #[sol(rpc)]
    interface ICFAv1Forwarder {
        function getFlowrate(address token, address sender, address receiver) external view returns (int96 flowrate);
    }
}
