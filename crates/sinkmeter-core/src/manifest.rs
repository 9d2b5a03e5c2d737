//! Static session configuration rendered as the `manifest` info metric.

/// The emitter's request: what is streamed and over which block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub output_module: String,
    pub start_block_num: i64,
    /// 0 means unbounded.
    pub stop_block_num: u64,
    pub production_mode: bool,
}

/// Everything the `manifest` gauge carries as labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub module_hash: String,
    pub manifest: String,
    pub substreams_endpoint: String,
    pub request: RequestDescriptor,
}

impl ManifestDescriptor {
    /// Label names of the `manifest` gauge, in registration order.
    pub const LABEL_NAMES: [&'static str; 7] = [
        "moduleHash",
        "manifest",
        "outputModule",
        "substreamsEndpoint",
        "startBlockNum",
        "stopBlockNum",
        "productionMode",
    ];

    /// Label values matching [`Self::LABEL_NAMES`], numeric fields stringified.
    pub fn label_values(&self) -> [String; 7] {
        [
            self.module_hash.clone(),
            self.manifest.clone(),
            self.request.output_module.clone(),
            self.substreams_endpoint.clone(),
            self.request.start_block_num.to_string(),
            self.request.stop_block_num.to_string(),
            self.request.production_mode.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values_are_stringified_in_order() {
        let m = ManifestDescriptor {
            module_hash: "0xabc".into(),
            manifest: "substreams.spkg".into(),
            substreams_endpoint: "eth.example:443".into(),
            request: RequestDescriptor {
                output_module: "out".into(),
                start_block_num: 100,
                stop_block_num: 200,
                production_mode: true,
            },
        };
        assert_eq!(
            m.label_values(),
            ["0xabc", "substreams.spkg", "out", "eth.example:443", "100", "200", "true"].map(String::from)
        );
    }
}
