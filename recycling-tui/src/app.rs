use std::sync::Arc;

use recycling_core::{
    Organisation, OrganisationService, RecycleResponse, Result, Storage, StorageId, StorageService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    Organisations,
    Storages,
    RecycleResult,
}

/// Response of the last recycle request, with the organisation it was for.
pub(crate) struct RecycleView {
    pub organisation: String,
    pub response: RecycleResponse,
    /// The request ended in a not-found style outcome.
    pub failed: bool,
}

pub(crate) struct App {
    pub organisation_service: Arc<OrganisationService>,
    pub storage_service: Arc<StorageService>,

    pub screen: Screen,
    pub organisations: Vec<Organisation>,
    pub organisation_index: usize,
    pub storages: Vec<Storage>,
    pub storage_index: usize,

    pub last_recycle: Option<RecycleView>,

    pub is_loading: bool,
    pub info_message: Option<String>,
    pub error_message: Option<String>,
}

impl App {
    pub(crate) fn new(organisation_service: Arc<OrganisationService>, storage_service: Arc<StorageService>) -> Self {
        Self {
            organisation_service,
            storage_service,
            screen: Screen::Organisations,
            organisations: Vec::new(),
            organisation_index: 0,
            storages: Vec::new(),
            storage_index: 0,
            last_recycle: None,
            is_loading: false,
            info_message: None,
            error_message: None,
        }
    }

    /// Reload both lists, keeping the cursors in range.
    pub(crate) async fn refresh(&mut self) -> Result<()> {
        self.organisations = self.organisation_service.organisations().await?;
        self.storages = self.storage_service.storages().await?;
        self.organisation_index = self.organisation_index.min(self.organisations.len().saturating_sub(1));
        self.storage_index = self.storage_index.min(self.storages.len().saturating_sub(1));
        Ok(())
    }

    pub(crate) fn selected_organisation(&self) -> Option<&Organisation> {
        self.organisations.get(self.organisation_index)
    }

    pub(crate) fn selected_storage(&self) -> Option<&Storage> {
        self.storages.get(self.storage_index)
    }

    pub(crate) fn storage_name(&self, id: StorageId) -> String {
        self.storages
            .iter()
            .find(|storage| storage.id == id)
            .map_or_else(|| format!("#{id}"), |storage| storage.name.clone())
    }

    pub(crate) fn move_up(&mut self) {
        let index = self.cursor();
        *index = index.saturating_sub(1);
    }

    pub(crate) fn move_down(&mut self) {
        let len = match self.screen {
            Screen::Storages => self.storages.len(),
            Screen::Organisations | Screen::RecycleResult => self.organisations.len(),
        };
        let index = self.cursor();
        if *index + 1 < len {
            *index += 1;
        }
    }

    pub(crate) fn switch_list(&mut self) {
        self.screen = match self.screen {
            Screen::Organisations => Screen::Storages,
            Screen::Storages | Screen::RecycleResult => Screen::Organisations,
        };
    }

    pub(crate) fn clear_messages(&mut self) {
        self.info_message = None;
        self.error_message = None;
    }

    fn cursor(&mut self) -> &mut usize {
        match self.screen {
            Screen::Storages => &mut self.storage_index,
            Screen::Organisations | Screen::RecycleResult => &mut self.organisation_index,
        }
    }
}
