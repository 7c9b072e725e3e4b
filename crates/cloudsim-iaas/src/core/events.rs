//! Standard simulation events.

// VM LIFECYCLE EVENTS /////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::core::common::{HostId, VmId};
    use crate::core::vm::VmSpec;

    /// Broker -> datacenter.
    #[derive(Clone, Serialize)]
    pub struct VmCreateRequest {
        pub vm_id: VmId,
        pub spec: VmSpec,
    }

    /// Datacenter -> broker.
    #[derive(Clone, Serialize)]
    pub struct VmCreated {
        pub vm_id: VmId,
        pub host_id: HostId,
    }

    /// Datacenter -> broker, no host of the datacenter fits the VM.
    #[derive(Clone, Serialize)]
    pub struct VmCreateFailed {
        pub vm_id: VmId,
        pub reason: String,
    }

    /// Broker -> datacenter.
    #[derive(Clone, Serialize)]
    pub struct VmDestroyRequest {
        pub vm_id: VmId,
    }

    /// Datacenter -> broker, host resources are released.
    #[derive(Clone, Serialize)]
    pub struct VmDestroyed {
        pub vm_id: VmId,
    }
}

// CLOUDLET EVENTS /////////////////////////////////////////////////////////////////////////////////

pub mod cloudlet {
    use serde::Serialize;

    use crate::core::cloudlet::Cloudlet;
    use crate::core::common::{CloudletId, VmId};

    /// Broker -> itself, fired after the cloudlet submission delay.
    #[derive(Clone, Serialize)]
    pub struct CloudletArrival {
        pub cloudlet_id: CloudletId,
    }

    /// Broker -> datacenter, carries the cloudlet bound to a VM.
    #[derive(Clone, Serialize)]
    pub struct CloudletSubmit {
        pub cloudlet: Cloudlet,
    }

    /// Datacenter -> broker, VM scheduler does not admit the cloudlet now.
    #[derive(Clone, Serialize)]
    pub struct CloudletRejected {
        pub cloudlet: Cloudlet,
        pub reason: String,
    }

    /// Datacenter -> broker, the cloudlet cannot run on its VM.
    #[derive(Clone, Serialize)]
    pub struct CloudletFailed {
        pub cloudlet: Cloudlet,
        pub reason: String,
    }

    /// Datacenter -> itself, the nearest cloudlet completion on the VM.
    #[derive(Clone, Serialize)]
    pub struct CloudletScheduleUpdate {
        pub vm_id: VmId,
    }

    /// Datacenter -> broker.
    #[derive(Clone, Serialize)]
    pub struct CloudletFinished {
        pub cloudlet: Cloudlet,
    }
}
