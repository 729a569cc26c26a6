mod gbuffer;
mod pass;
mod probe_drawing;
mod probe_placement;

use derivative::Derivative;
use log::debug;

pub use self::gbuffer::*;
pub use self::pass::*;
pub use self::probe_drawing::*;
pub use self::probe_placement::*;
use crate::{Backend, GiConfig, Result};

macro_rules! passes {
    ([ $( $name:ident => $class:ident, )* ]) => {
        $( mod $name; )*
        $( pub use self::$name::*; )*

        #[derive(Derivative)]
        #[derivative(Debug(bound = ""))]
        pub struct GiPasses<B>
        where
            B: Backend,
        {
            $( pub $name: $class<B>, )*
        }

        impl<B> GiPasses<B>
        where
            B: Backend,
        {
            pub fn new(backend: &mut B, config: &GiConfig) -> Result<Self> {
                debug!("Initializing GI passes");

                Ok(Self {
                    $( $name: $class::new(backend, config)?, )*
                })
            }

            /// Re-creates all pipelines; returns how many of them have been
            /// reloaded successfully.
            pub fn reload(&mut self, backend: &mut B) -> usize {
                let mut reloaded = 0;

                $( reloaded += self.$name.reload(backend) as usize; )*

                reloaded
            }

            pub const LEN: usize = [$( stringify!($name), )*].len();
        }
    };
}

passes!([
    composite => CompositePass,
    direct_sampling => DirectSamplingPass,
    spatial_resampling => SpatialResamplingPass,
]);

/// Passes of the diffuse probes; present only when probes are enabled.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ProbePasses<B>
where
    B: Backend,
{
    pub placement: ProbePlacementPass<B>,
    pub drawing: ProbeDrawingPass<B>,
}

impl<B> ProbePasses<B>
where
    B: Backend,
{
    pub const LEN: usize = 2;

    pub fn new(backend: &mut B, config: &GiConfig) -> Result<Self> {
        debug!("Initializing probe passes");

        Ok(Self {
            placement: ProbePlacementPass::new(backend, config)?,
            drawing: ProbeDrawingPass::new(backend, config)?,
        })
    }

    pub fn reload(&mut self, backend: &mut B) -> usize {
        self.placement.reload(backend) as usize
            + self.drawing.reload(backend) as usize
    }
}
