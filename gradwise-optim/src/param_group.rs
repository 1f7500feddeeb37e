use gradwise_core::SharedParameter;

/// A group of parameters sharing optimizer options.
///
/// Groups let parts of a model train with their own learning rate.
#[derive(Clone, Debug)]
pub struct ParamGroup {
    params: Vec<SharedParameter>,

    /// Specific options for this group.
    pub options: ParamGroupOptions,
}

/// Options specific to a parameter group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamGroupOptions {
    /// Overrides the rule's learning rate when set.
    pub lr: Option<f32>,
}

impl ParamGroup {
    /// Creates a new parameter group with default options.
    pub fn new(params: Vec<SharedParameter>) -> Self {
        ParamGroup {
            params,
            options: ParamGroupOptions::default(),
        }
    }

    pub fn with_lr(params: Vec<SharedParameter>, lr: f32) -> Self {
        ParamGroup {
            params,
            options: ParamGroupOptions { lr: Some(lr) },
        }
    }

    /// The parameters of this group, in registration order.
    pub fn params(&self) -> &[SharedParameter] {
        &self.params
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.options.lr = Some(lr);
    }

    pub fn get_lr(&self) -> Option<f32> {
        self.options.lr
    }
}
