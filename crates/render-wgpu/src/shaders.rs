/// WGSL shader for the opaque backdrop: instanced, lit, white spheres.
pub const SCENE_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    position: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
};

@vertex
fn vs_scene(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    let world_pos = model * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = camera.view_proj * world_pos;
    out.world_normal = normalize((model * vec4<f32>(vertex.normal, 0.0)).xyz);
    return out;
}

@fragment
fn fs_scene(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(-1.0, 1.0, 1.0));
    let ambient = 0.55;
    let diffuse = max(dot(in.world_normal, light_dir), 0.0);
    let lighting = ambient + diffuse * 0.45;
    return vec4<f32>(vec3<f32>(lighting), 1.0);
}
"#;

/// WGSL program for the refractive mesh.
///
/// Samples the captured background through six bands, recombines them into
/// RGB with a saturation blend reapplied to the running sum on every step,
/// then adds specular and fresnel terms. Output is not clamped.
pub const DISPERSION_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    position: vec4<f32>,
};

struct Dispersion {
    // red, yellow, green, cyan
    ior_rygc: vec4<f32>,
    // blue, purple, refract power, chromatic aberration
    ior_bp_power_aberration: vec4<f32>,
    // light direction, saturation
    light_saturation: vec4<f32>,
    // shininess, diffuseness, fresnel power, band samples
    shading: vec4<f32>,
    resolution: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(1) @binding(0)
var<uniform> material: Dispersion;
@group(1) @binding(1)
var captured: texture_2d<f32>;
@group(1) @binding(2)
var captured_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) eye_vector: vec3<f32>,
};

const LUMA: vec3<f32> = vec3<f32>(0.2125, 0.7154, 0.0721);
const SLIDE_RANGE: f32 = 0.1;

@vertex
fn vs_dispersion(vertex: VertexInput) -> VertexOutput {
    let world_pos = camera.model * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = camera.view_proj * world_pos;
    out.world_normal = normalize((camera.model * vec4<f32>(vertex.normal, 0.0)).xyz);
    out.eye_vector = normalize(world_pos.xyz - camera.position.xyz);
    return out;
}

fn adjust_saturation(rgb: vec3<f32>, amount: f32) -> vec3<f32> {
    let intensity = vec3<f32>(dot(rgb, LUMA));
    return mix(intensity, rgb, amount);
}

fn fresnel(eye: vec3<f32>, normal: vec3<f32>, power: f32) -> f32 {
    let facing = abs(dot(eye, normal));
    return pow(max(1.0 - facing, 0.0), power);
}

fn specular(normal: vec3<f32>, eye: vec3<f32>, light_dir: vec3<f32>, shininess: f32, diffuseness: f32) -> f32 {
    let light = normalize(-light_dir);
    let half_vector = normalize(eye + light);
    let k_diffuse = max(0.0, dot(normal, light));
    let k_specular = pow(max(0.0, dot(normal, half_vector)), shininess);
    return k_specular + k_diffuse * diffuseness;
}

// Screen y grows downward, so the refracted y is negated.
fn sample_capture(uv: vec2<f32>, refracted: vec3<f32>, spread: f32) -> vec3<f32> {
    let power = material.ior_bp_power_aberration.z;
    let aberration = material.ior_bp_power_aberration.w;
    let offset = vec2<f32>(refracted.x, -refracted.y) * (power + spread);
    return textureSampleLevel(captured, captured_sampler, uv + offset * aberration, 0.0).rgb;
}

@fragment
fn fs_dispersion(in: VertexOutput) -> @location(0) vec4<f32> {
    let uv = in.clip_position.xy / material.resolution.xy;
    let normal = in.world_normal;
    let eye = in.eye_vector;

    let refract_r = refract(eye, normal, 1.0 / material.ior_rygc.x);
    let refract_y = refract(eye, normal, 1.0 / material.ior_rygc.y);
    let refract_g = refract(eye, normal, 1.0 / material.ior_rygc.z);
    let refract_c = refract(eye, normal, 1.0 / material.ior_rygc.w);
    let refract_b = refract(eye, normal, 1.0 / material.ior_bp_power_aberration.x);
    let refract_p = refract(eye, normal, 1.0 / material.ior_bp_power_aberration.y);

    let samples = max(u32(material.shading.w), 1u);
    var color = vec3<f32>(0.0);
    for (var i = 0u; i < samples; i = i + 1u) {
        let slide = f32(i) / f32(samples) * SLIDE_RANGE;

        let texel_r = sample_capture(uv, refract_r, slide * 1.0);
        let texel_y = sample_capture(uv, refract_y, slide * 1.0);
        let texel_g = sample_capture(uv, refract_g, slide * 2.0);
        let texel_c = sample_capture(uv, refract_c, slide * 2.5);
        let texel_b = sample_capture(uv, refract_b, slide * 3.0);
        let texel_p = sample_capture(uv, refract_p, slide * 1.0);

        let r = texel_r.r * 0.5;
        let y = (texel_y.r * 2.0 + texel_y.g * 2.0 - texel_y.b) / 6.0;
        let g = texel_g.g * 0.5;
        let c = (texel_c.g * 2.0 + texel_c.b * 2.0 - texel_c.r) / 6.0;
        let b = texel_b.b * 0.5;
        let p = (texel_p.b * 2.0 + texel_p.r * 2.0 - texel_p.g) / 6.0;

        color += vec3<f32>(
            r + (2.0 * p + 2.0 * y - c) / 3.0,
            g + (2.0 * y + 2.0 * c - p) / 3.0,
            b + (2.0 * c + 2.0 * p - y) / 3.0,
        );
        color = adjust_saturation(color, material.light_saturation.w);
    }
    color /= f32(samples);

    color += vec3<f32>(specular(
        normal,
        eye,
        material.light_saturation.xyz,
        material.shading.x,
        material.shading.y,
    ));
    color += vec3<f32>(fresnel(eye, normal, material.shading.z));

    return vec4<f32>(color, 1.0);
}
"#;
