/// The bind group layout every pipeline sampling the atlas shares:
/// the array texture at binding 0, the sampler at binding 1.
pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("sprite_atlas_bind_group_layout"),
        entries: &[
            // array texture
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2Array,
                    multisampled: false,
                },
                count: None,
            },
            // sampler
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Cached sampling surface for the atlas texture.
///
/// Sprites are point-sampled: nearest filtering, clamp-to-edge wrapping.
/// Growth replaces the texture, so the atlas invalidates this cache whenever
/// the view it was built from goes away.
pub(crate) struct AtlasBinding {
    sampler: Option<wgpu::Sampler>,
    bind_group: Option<wgpu::BindGroup>,
}

impl AtlasBinding {
    pub(crate) fn new() -> Self {
        Self {
            sampler: None,
            bind_group: None,
        }
    }

    /// Drop the cached bind group. Called when growth or release replaces the
    /// texture the group referenced.
    pub(crate) fn invalidate(&mut self) {
        self.bind_group = None;
    }

    pub(crate) fn bind_group(
        &mut self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
    ) -> &wgpu::BindGroup {
        let sampler = self.sampler.get_or_insert_with(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("sprite_atlas_sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        });

        self.bind_group.get_or_insert_with(|| {
            let layout = bind_group_layout(device);
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sprite_atlas_bind_group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }
}
