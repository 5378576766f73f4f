use crate::resolver_dispatch::ResolvePhase;

#[test]
fn tile_resolve_wgsl_parses_and_validates() {
    let source = include_str!("tile_resolve.wgsl");
    let module = parse_wgsl("tile_resolve.wgsl", source);
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .unwrap_or_else(|error| panic!("WGSL validation failed for tile_resolve.wgsl: {error:?}"));
}

#[test]
fn tile_resolve_wgsl_exposes_every_phase_entry_point() {
    let module = parse_wgsl("tile_resolve.wgsl", include_str!("tile_resolve.wgsl"));
    for phase in ResolvePhase::ALL {
        let entry_point = module
            .entry_points
            .iter()
            .find(|entry_point| entry_point.name == phase.entry_point())
            .unwrap_or_else(|| panic!("missing entry point {}", phase.entry_point()));
        assert_eq!(entry_point.stage, naga::ShaderStage::Compute);
        assert_eq!(entry_point.workgroup_size, [crate::WORKGROUP_SIZE, 1, 1]);
    }
}

fn parse_wgsl(label: &str, source: &str) -> naga::Module {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    })
}
